use std::fmt;

use crate::case::{Case, CaseStatus};
use crate::core_types::{Actor, Role};
use crate::error::CoreError;
use crate::offer::Offer;

/// Everything an actor can ask the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateCase,
    ViewCase,
    Publish,
    /// Hold / resume / close
    UpdateStatus,
    RetryPayment,
    /// Post-close attestation
    Verify,
    AssignDirect,
    DeclineAssignment,
    /// A provider assigning a case to themselves outside bidding
    SelfClaim,
    SendMessage,
    UpdateSolution,
    SubmitOffer,
    ListOffers,
    AcceptOffer,
    WithdrawOffer,
    CreateOrder,
    /// Synchronous checkout confirmation
    ConfirmPayment,
    SoftDelete,
    ManagePayment,
    SweepOffers,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateCase => "CREATE_CASE",
            Action::ViewCase => "VIEW_CASE",
            Action::Publish => "PUBLISH",
            Action::UpdateStatus => "UPDATE_STATUS",
            Action::RetryPayment => "RETRY_PAYMENT",
            Action::Verify => "VERIFY",
            Action::AssignDirect => "ASSIGN_DIRECT",
            Action::DeclineAssignment => "DECLINE_ASSIGNMENT",
            Action::SelfClaim => "SELF_CLAIM",
            Action::SendMessage => "SEND_MESSAGE",
            Action::UpdateSolution => "UPDATE_SOLUTION",
            Action::SubmitOffer => "SUBMIT_OFFER",
            Action::ListOffers => "LIST_OFFERS",
            Action::AcceptOffer => "ACCEPT_OFFER",
            Action::WithdrawOffer => "WITHDRAW_OFFER",
            Action::CreateOrder => "CREATE_ORDER",
            Action::ConfirmPayment => "CONFIRM_PAYMENT",
            Action::SoftDelete => "SOFT_DELETE",
            Action::ManagePayment => "MANAGE_PAYMENT",
            Action::SweepOffers => "SWEEP_OFFERS",
        }
    }

    /// Actions reserved for administrators regardless of case.
    fn admin_only(&self) -> bool {
        matches!(
            self,
            Action::Verify | Action::SoftDelete | Action::ManagePayment | Action::SweepOffers
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Provider reach over a case: assigned, or unassigned in one of their
/// practice areas and not soft-deleted.
fn provider_reaches(actor: &Actor, case: &Case) -> bool {
    if actor.role != Role::Provider {
        return false;
    }
    match case.assigned_provider_id {
        Some(provider) => provider == actor.id,
        None => !case.deleted && actor.specializes_in(case.category),
    }
}

fn allowed(actor: &Actor, case: &Case, action: Action) -> bool {
    let owner = case.is_owner(actor.id);
    let assigned = case.is_assigned_to(actor.id);

    match action {
        Action::SelfClaim => false,

        Action::CreateCase => actor.role == Role::Client,

        Action::ViewCase | Action::ListOffers => {
            owner || actor.is_admin() || provider_reaches(actor, case)
        }

        Action::Publish
        | Action::AssignDirect
        | Action::AcceptOffer
        | Action::RetryPayment
        | Action::CreateOrder
        | Action::ConfirmPayment => owner,

        Action::UpdateStatus => owner || assigned || actor.is_admin(),

        Action::DeclineAssignment => assigned,

        Action::SendMessage | Action::UpdateSolution
            if case.status == CaseStatus::PendingApproval =>
        {
            false
        }
        Action::SendMessage => owner || assigned,
        Action::UpdateSolution => assigned,

        Action::SubmitOffer => !owner && provider_reaches(actor, case),

        // Offer ownership is checked in `authorize_offer`
        Action::WithdrawOffer => actor.role == Role::Provider && !owner,

        Action::Verify | Action::SoftDelete | Action::ManagePayment | Action::SweepOffers => {
            actor.is_admin()
        }
    }
}

fn deny(actor: &Actor, case: Option<&Case>, action: Action) -> CoreError {
    let case_id = case.map(|c| c.id);
    tracing::warn!(
        actor = %actor.id,
        role = %actor.role,
        case_id = ?case_id,
        action = %action,
        "Authorization denied"
    );
    CoreError::Authorization {
        actor: actor.id,
        role: actor.role,
        case_id,
        action,
    }
}

/// Decide whether `actor` may perform `action` on `case`.
pub fn authorize(actor: &Actor, case: &Case, action: Action) -> Result<(), CoreError> {
    if allowed(actor, case, action) {
        Ok(())
    } else {
        Err(deny(actor, Some(case), action))
    }
}

/// Case rule plus the offer-level rule: only the submitting provider may
/// withdraw.
pub fn authorize_offer(
    actor: &Actor,
    case: &Case,
    offer: &Offer,
    action: Action,
) -> Result<(), CoreError> {
    authorize(actor, case, action)?;
    if action == Action::WithdrawOffer && offer.provider_id != actor.id {
        return Err(deny(actor, Some(case), action));
    }
    Ok(())
}

/// Actions with no case subject (case creation, sweep).
pub fn authorize_global(actor: &Actor, action: Action) -> Result<(), CoreError> {
    let permitted = match action {
        Action::CreateCase => actor.role == Role::Client,
        other => other.admin_only() && actor.is_admin(),
    };
    if permitted {
        Ok(())
    } else {
        Err(deny(actor, None, action))
    }
}
