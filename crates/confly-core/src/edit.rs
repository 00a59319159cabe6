// ── Tree copy ──
//
// Walks one selection's data into another: the basis of to_json, upsert
// and insert. Containers and list entries are created on the destination
// with `new` set; data the source hides or lacks is skipped.

use futures_util::future::BoxFuture;

use crate::error::NodeError;
use crate::meta::Kind;
use crate::node::{ChildRequest, FieldRequest, ListRequest};
use crate::selection::Selection;

pub(crate) fn copy_into<'a>(
    from: &'a Selection,
    to: &'a Selection,
) -> BoxFuture<'a, Result<(), NodeError>> {
    Box::pin(async move {
        if from.meta().is_list() && from.path().key().is_none() {
            return copy_entries(from, to).await;
        }
        let meta = std::sync::Arc::clone(from.meta());
        for def in meta.data_children() {
            match def.kind {
                Kind::Leaf | Kind::LeafList => {
                    let Some(value) = from.node().read(FieldRequest::new(from, def)).await? else {
                        continue;
                    };
                    to.node()
                        .write(FieldRequest::new(to, def), Some(value))
                        .await?;
                }
                Kind::Container | Kind::List => {
                    let Some(src) = from.node().child(ChildRequest::new(from, def)).await? else {
                        continue;
                    };
                    let mut r = ChildRequest::new(to, def);
                    r.new = true;
                    let dst = to
                        .node()
                        .child(r)
                        .await?
                        .ok_or_else(|| NodeError::NotFound {
                            path: to.path().child(def).to_string(),
                        })?;
                    let from = from.derive(from.path().child(def), src);
                    let to = to.derive(to.path().child(def), dst);
                    copy_into(&from, &to).await?;
                }
                _ => {}
            }
        }
        Ok(())
    })
}

async fn copy_entries(from: &Selection, to: &Selection) -> Result<(), NodeError> {
    let mut row = 0;
    while let Some(entry) = from.node().next(ListRequest::by_row(from, row)).await? {
        let mut r = ListRequest::by_key(to, entry.key.clone());
        r.new = true;
        let dst = to.node().next(r).await?.ok_or_else(|| NodeError::NotFound {
            path: to.path().with_key(entry.key.clone()).to_string(),
        })?;
        let src = from.derive(from.path().with_key(entry.key), entry.node);
        let dst = to.derive(to.path().with_key(dst.key), dst.node);
        copy_into(&src, &dst).await?;
        row += 1;
    }
    Ok(())
}
