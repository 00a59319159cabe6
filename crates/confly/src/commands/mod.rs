//! Command dispatch: bridges CLI args -> selections -> output formatting.

pub mod data;
pub mod rpc;
pub mod util;

use confly_api::Device;
use confly_core::{Role, Selection};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// A connected device plus the role every selection runs under.
pub struct Session {
    pub device: Device,
    pub role: Option<Role>,
}

impl Session {
    pub fn new(device: Device, role: Option<Role>) -> Self {
        Self { device, role }
    }

    /// Root selection of `module`, behind access control when a role is set.
    pub async fn root(&self, module: &str) -> Result<Selection, CliError> {
        let root = self.device.browser(module).await?.root();
        Ok(match &self.role {
            Some(role) => root.with_role(role.clone()),
            None => root,
        })
    }
}

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    session: &Session,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let result = match cmd {
        Command::Get(args) => Some(data::get(session, &args).await?),
        Command::Put(args) => {
            data::put(session, &args).await?;
            None
        }
        Command::Post(args) => {
            data::post(session, &args).await?;
            None
        }
        Command::Delete(args) => {
            data::delete(session, &args).await?;
            None
        }
        Command::Invoke(args) => rpc::invoke(session, &args).await?,
        Command::Subscribe(args) => {
            rpc::subscribe(session, &args, |event| {
                let rendered = output::render(global.output, &event)?;
                output::print_output(&rendered, global.quiet);
                Ok(())
            })
            .await?;
            None
        }
    };
    if let Some(value) = result {
        output::print_output(&output::render(global.output, &value)?, global.quiet);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Arc;

    use confly_api::{ConnectionConfig, Device};
    use confly_core::{Definition, Role};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::Session;

    fn car() -> Arc<Definition> {
        Definition::module(
            "car",
            vec![
                Definition::container(
                    "engine",
                    vec![
                        Definition::leaf("speed"),
                        Definition::leaf("mode"),
                        Definition::action(
                            "start",
                            Some(vec![Definition::leaf("gear")]),
                            Some(vec![Definition::leaf("rpm")]),
                        ),
                        Definition::notification("overheat", vec![Definition::leaf("temp")]),
                    ],
                ),
                Definition::list(
                    "tire",
                    &["pos"],
                    vec![Definition::leaf("pos"), Definition::leaf("wear")],
                ),
            ],
        )
    }

    pub(crate) async fn session(role: Option<Role>) -> (MockServer, Session) {
        let server = MockServer::start().await;
        let device =
            Device::connect(&ConnectionConfig::new(format!("{}/restconf", server.uri()))).unwrap();
        device.register(car());
        (server, Session::new(device, role))
    }

    pub(crate) async fn mount_options(server: &MockServer, target: &str) {
        Mock::given(method("OPTIONS"))
            .and(path(format!("/restconf/data/car:{target}")))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }
}
