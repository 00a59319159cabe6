//! Action invocation and notification streaming.

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::cli::{InvokeArgs, SubscribeArgs};
use crate::commands::Session;
use crate::commands::util::{locate, read_payload, split_last};
use crate::error::CliError;

/// Run the action at the target; its output, if it produced any.
pub async fn invoke(session: &Session, args: &InvokeArgs) -> Result<Option<Value>, CliError> {
    let input = read_payload(&args.payload).await?;
    let root = session.root(&args.target.module).await?;
    let (parent, ident) = split_last(&args.target.path);
    let parent = locate(&root, parent).await?;

    match parent.action(ident, input).await? {
        Some(output) => Ok(Some(output.to_json().await?)),
        None => Ok(None),
    }
}

/// Stream the target notification into `on_event` until the server closes
/// the stream, `--count` events arrived, or Ctrl-C.
///
/// Events that could not be decoded are logged and skipped; a subscription
/// the role may not open is an error.
pub async fn subscribe(
    session: &Session,
    args: &SubscribeArgs,
    mut on_event: impl FnMut(Value) -> Result<(), CliError>,
) -> Result<usize, CliError> {
    let root = session.root(&args.target.module).await?;
    let (parent, ident) = split_last(&args.target.path);
    let parent = locate(&root, parent).await?;
    let mut sub = parent.notifications(ident).await?;

    let mut received = 0;
    loop {
        if args.count.is_some_and(|n| received >= n) {
            break;
        }
        let notification = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            n = sub.recv() => match n {
                Some(n) => n,
                None => break,
            },
        };
        match notification.event {
            Ok(event) => {
                on_event(json!({
                    "eventTime": notification.event_time.to_rfc3339(),
                    "event": event.to_json().await?,
                }))?;
                received += 1;
            }
            Err(err) if err.is_unauthorized() => return Err(err.into()),
            Err(err) => warn!(error = %err, "event skipped"),
        }
    }
    sub.cancel();
    Ok(received)
}
