//! Release branch selection

use crate::collaborators::VersionControl;
use crate::error::PipelineResult;

/// What `ensure_branch` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAction {
    AlreadyOn,
    CheckedOut,
    Created,
}

/// Switch to `branch`, creating it from HEAD if it does not exist.
///
/// A dirty working tree is stashed around the switch and restored on the
/// target branch. The stash is popped even when the switch fails.
pub async fn ensure_branch(vcs: &dyn VersionControl, branch: &str) -> PipelineResult<BranchAction> {
    if vcs.current_branch().await? == branch {
        return Ok(BranchAction::AlreadyOn);
    }

    let exists = vcs.branch_exists(branch).await?;
    let stashed = vcs.is_dirty().await?;
    if stashed {
        vcs.stash_push(&format!("changegate: switching to {}", branch)).await?;
    }

    let (switched, action) = if exists {
        (vcs.checkout(branch).await, BranchAction::CheckedOut)
    } else {
        (vcs.create_branch(branch).await, BranchAction::Created)
    };

    if stashed {
        let popped = vcs.stash_pop().await;
        switched?;
        popped?;
    } else {
        switched?;
    }

    tracing::info!(branch, ?action, stashed, "release branch ready");
    Ok(action)
}
