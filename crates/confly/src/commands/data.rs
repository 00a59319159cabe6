//! Data commands: get, put, post, delete.

use serde_json::{Map, Value};

use crate::cli::{TargetArgs, WriteArgs};
use crate::commands::Session;
use crate::commands::util::{locate, require_payload, split_last};
use crate::error::CliError;

/// Everything visible at the target; a single value for a leaf.
pub async fn get(session: &Session, args: &TargetArgs) -> Result<Value, CliError> {
    let root = session.root(&args.module).await?;
    let rel = args.path.trim_matches('/');
    if rel.is_empty() {
        return Ok(root.to_json().await?);
    }

    let target = root.path().resolve(rel)?;
    if target.meta().is_leaf() {
        let (parent, leaf) = split_last(rel);
        let parent = locate(&root, parent).await?;
        return parent
            .get(leaf)
            .await?
            .ok_or_else(|| CliError::NotFound { path: rel.into() });
    }
    Ok(locate(&root, rel).await?.to_json().await?)
}

/// Merge the payload into an existing target.
pub async fn put(session: &Session, args: &WriteArgs) -> Result<(), CliError> {
    let payload = require_payload(&args.payload).await?;
    let root = session.root(&args.target.module).await?;
    let target = locate(&root, &args.target.path).await?;
    target.upsert_json(payload).await?;
    Ok(())
}

/// Create the target by posting it, wrapped in its own name, to its parent.
pub async fn post(session: &Session, args: &WriteArgs) -> Result<(), CliError> {
    let payload = require_payload(&args.payload).await?;
    let root = session.root(&args.target.module).await?;
    let (parent_rel, ident) = split_last(&args.target.path);
    if ident.is_empty() || ident.contains('=') {
        return Err(CliError::Validation {
            field: "path".into(),
            reason: "post names the container or list to create in, without a key".into(),
        });
    }

    let parent = locate(&root, parent_rel).await?;
    let Some(def) = parent.meta().find(ident) else {
        return Err(CliError::Validation {
            field: "path".into(),
            reason: format!("'{ident}' is not defined under '{}'", parent.meta().ident),
        });
    };
    let content = match payload {
        entry @ Value::Object(_) if def.is_list() => Value::Array(vec![entry]),
        other => other,
    };
    let mut body = Map::new();
    body.insert(def.ident.clone(), content);
    parent.insert_json(Value::Object(body)).await?;
    Ok(())
}

pub async fn delete(session: &Session, args: &TargetArgs) -> Result<(), CliError> {
    if args.path.trim_matches('/').is_empty() {
        return Err(CliError::Validation {
            field: "path".into(),
            reason: "refusing to delete a whole module".into(),
        });
    }
    let root = session.root(&args.module).await?;
    root.delete(&args.path).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use confly_core::{Permission, Role};

    use super::*;
    use crate::cli::PayloadArgs;
    use crate::commands::tests::{mount_options, session};

    fn target(path: &str) -> TargetArgs {
        TargetArgs {
            module: "car".into(),
            path: path.into(),
        }
    }

    fn write(path: &str, data: Value) -> WriteArgs {
        WriteArgs {
            target: target(path),
            payload: PayloadArgs {
                data: Some(data.to_string()),
                file: None,
            },
        }
    }

    #[tokio::test]
    async fn get_leaf_and_container() {
        let (server, session) = session(None).await;
        mount_options(&server, "engine").await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/car:engine"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"car:engine": {"speed": 88, "mode": "eco"}})),
            )
            .mount(&server)
            .await;

        assert_eq!(
            get(&session, &target("engine/speed")).await.unwrap(),
            json!(88)
        );
        assert_eq!(
            get(&session, &target("engine")).await.unwrap(),
            json!({"speed": 88, "mode": "eco"})
        );
    }

    #[tokio::test]
    async fn hidden_subtree_reads_as_not_found() {
        let role = Role::new("viewer")
            .with_grant("car", Permission::Read)
            .with_grant("car/engine", Permission::None);
        let (server, session) = session(Some(role)).await;

        let err = get(&session, &target("engine")).await.unwrap_err();
        assert!(matches!(err, CliError::NotFound { ref path } if path == "engine"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_merges_into_existing() {
        let (server, session) = session(None).await;
        mount_options(&server, "engine").await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/car:engine"))
            .and(query_param("content", "config"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"car:engine": {"speed": 10, "mode": "eco"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/restconf/data/car:engine"))
            .and(body_json(json!({"car:speed": 55, "car:mode": "eco"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        put(&session, &write("engine", json!({"speed": 55})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_sends_only_the_new_entry() {
        let (server, session) = session(None).await;
        Mock::given(method("GET"))
            .and(path("/restconf/data/car:"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "car:engine": {"car:speed": 40},
                "car:tire": [{"car:pos": "fl", "car:wear": 3}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/restconf/data/car:"))
            .and(body_json(json!({"car:tire": [{"pos": "rr", "wear": 0}]})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        post(&session, &write("tire", json!({"pos": "rr", "wear": 0})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_requires_write_grant() {
        let role = Role::new("viewer").with_grant("car", Permission::Read);
        let (server, session) = session(Some(role)).await;
        mount_options(&server, "tire=fl").await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let err = delete(&session, &target("tire=fl")).await.unwrap_err();
        assert!(matches!(err, CliError::Unauthorized { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn delete_list_entry() {
        let (server, session) = session(None).await;
        mount_options(&server, "tire=fl").await;
        Mock::given(method("DELETE"))
            .and(path("/restconf/data/car:tire=fl"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        delete(&session, &target("tire=fl")).await.unwrap();
        assert!(matches!(
            delete(&session, &target("")).await,
            Err(CliError::Validation { .. })
        ));
    }
}
