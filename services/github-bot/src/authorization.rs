//! Authorization gate
//!
//! A command may be run by the author of the target issue or by a member of
//! the privileged group. The denial message also names an admin category;
//! admins are not looked up separately.

use serde::Serialize;
use tracing::{debug, warn};

use crate::collaborators::TeamDirectory;

/// Decision plus the identities it was based on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub authorized: bool,
    pub comment_author: String,
    pub issue_author: String,
    /// `None` when the lookup was not needed (author of the issue)
    pub privileged_member: Option<bool>,
}

impl AuthorizationDecision {
    pub fn is_issue_author(&self) -> bool {
        self.comment_author.eq_ignore_ascii_case(&self.issue_author)
    }
}

/// Decide whether `comment_author` may act on an issue opened by `issue_author`.
///
/// A failed membership lookup counts as "not a member".
pub async fn authorize(
    comment_author: &str,
    issue_author: &str,
    directory: &dyn TeamDirectory,
) -> AuthorizationDecision {
    let mut decision = AuthorizationDecision {
        authorized: false,
        comment_author: comment_author.to_string(),
        issue_author: issue_author.to_string(),
        privileged_member: None,
    };

    if decision.is_issue_author() {
        debug!(user = %comment_author, "Comment author opened the issue");
        decision.authorized = true;
        return decision;
    }

    let member = match directory.is_privileged_member(comment_author).await {
        Ok(member) => member,
        Err(e) => {
            warn!(user = %comment_author, error = %e, "Privileged group lookup failed");
            false
        }
    };
    debug!(user = %comment_author, member, "Privileged group membership");

    decision.privileged_member = Some(member);
    decision.authorized = member;
    decision
}
