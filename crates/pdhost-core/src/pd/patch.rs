//! Handle to a patch opened in one instance

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::engine::PatchId;
use super::error::{PdError, PdResult};
use super::instance::Shared;

/// A patch loaded into exactly one [`PdInstance`](super::PdInstance)
///
/// The patch stays open until [`dispose`](Patch::dispose) is called or
/// its instance is disposed. Dropping the handle does not close it.
pub struct Patch {
    shared: Arc<Shared>,
    id: PatchId,
    dollar_zero: i32,
    path: PathBuf,
}

impl Patch {
    pub(crate) fn new(shared: Arc<Shared>, id: PatchId, dollar_zero: i32, path: PathBuf) -> Self {
        Self {
            shared,
            id,
            dollar_zero,
            path,
        }
    }

    /// The $0 value for instance-scoped receives (e.g. `$0-param0`)
    pub fn dollar_zero(&self) -> i32 {
        self.dollar_zero
    }

    /// Prefix a local receiver or array name with this patch's $0
    pub fn local_name(&self, name: &str) -> String {
        format!("{}-{}", self.dollar_zero, name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id of the owning instance
    pub fn instance_id(&self) -> u32 {
        self.shared.id()
    }

    /// Whether the patch is still open in a live instance
    pub fn is_open(&self) -> bool {
        self.shared
            .with_book(|book| book.patches.contains_key(&self.id))
            .unwrap_or(false)
    }

    /// Close the patch
    ///
    /// Fails with `UseAfterDispose` if the patch was already disposed or
    /// its instance has been disposed. Other instances are not touched.
    pub fn dispose(&self) -> PdResult<()> {
        let id = self.id;
        let what = format!("Patch {} ($0={})", self.path.display(), self.dollar_zero);
        self.shared
            .call(|engine, book| {
                if book.patches.remove(&id).is_none() {
                    return Err(PdError::disposed(what.clone()));
                }
                engine.close_patch(id)
            })
            .map_err(|e| match e {
                PdError::UseAfterDispose { .. } => PdError::disposed(what.clone()),
                other => other,
            })?;

        log::info!(
            "Instance {}: closed patch {}",
            self.shared.id(),
            self.path.display()
        );
        Ok(())
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("instance", &self.shared.id())
            .field("dollar_zero", &self.dollar_zero)
            .field("path", &self.path)
            .finish()
    }
}
