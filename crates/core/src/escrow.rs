//! Escrow ledger: funding a task and moving its milestones to settlement.
//!
//! Every milestone update names the status it expects to find. Callers may
//! pass the status they last observed; otherwise the action's own starting
//! status is used. A mismatch is a [`MarketError::StaleState`] and nothing is
//! written.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::events::MarketEvent;
use crate::market::Marketplace;
use crate::milestone::{Milestone, MilestoneAction, MilestoneStatus};
use crate::models::TaskStatus;
use crate::money::Kobo;
use crate::store::Tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Pending,
    Funded,
    Settled,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Funded => "funded",
            EscrowStatus::Settled => "settled",
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Uuid,
    /// Payment reference the provider echoes back in its webhook
    pub reference: String,
    pub amount: Kobo,
    pub fee: Kobo,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub funded_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Escrow {
    /// What the client is charged: escrowed amount plus escrow fee.
    ///
    /// `initialize_funding` refuses escrows whose charge does not fit in
    /// [`Kobo`], so the saturating add never clamps for a stored escrow.
    pub fn total_charge(&self) -> Kobo {
        self.amount.saturating_add(self.fee)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneInput {
    pub title: String,
    pub amount: Kobo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscrowView {
    #[serde(flatten)]
    pub escrow: Escrow,
    pub total_charge: Kobo,
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    /// Work accepted; the milestone returns to approved and is released.
    ReleaseToFreelancer,
    /// Funds go back to the client.
    RefundClient,
}

impl Marketplace {
    /// Create the escrow for an in-progress task, split into milestones.
    /// It stays pending until the payment webhook confirms the charge.
    pub fn initialize_funding(
        &self,
        client_id: Uuid,
        task_id: Uuid,
        milestones: Vec<MilestoneInput>,
    ) -> MarketResult<EscrowView> {
        if milestones.is_empty() {
            return Err(MarketError::Validation(
                "at least one milestone is required".to_string(),
            ));
        }
        let mut amount: Kobo = 0;
        for milestone in &milestones {
            if milestone.title.trim().is_empty() {
                return Err(MarketError::Validation(
                    "milestone title is required".to_string(),
                ));
            }
            if milestone.amount <= 0 {
                return Err(MarketError::InvalidAmount(format!(
                    "milestone amount must be positive, got {}",
                    milestone.amount
                )));
            }
            amount = amount
                .checked_add(milestone.amount)
                .ok_or_else(|| MarketError::InvalidAmount("escrow total overflows".to_string()))?;
        }
        let fee = self.settings.escrow_fees.fee(amount)?;
        if amount.checked_add(fee).is_none() {
            return Err(MarketError::InvalidAmount(
                "escrow charge overflows".to_string(),
            ));
        }

        let mut tables = self.store.write();
        tables.verified_user(client_id)?;
        let task = tables.task(task_id)?;
        if task.client_id != client_id {
            return Err(MarketError::Forbidden("not the owner of this task".to_string()));
        }
        let freelancer_id = match (task.status, task.freelancer_id) {
            (TaskStatus::InProgress, Some(freelancer_id)) => freelancer_id,
            _ => {
                return Err(MarketError::Validation(
                    "escrow can only be funded once a freelancer is hired".to_string(),
                ))
            }
        };
        if tables.escrows.values().any(|e| e.task_id == task_id) {
            return Err(MarketError::AlreadyExists("escrow for this task".to_string()));
        }

        let now = Utc::now();
        let escrow = Escrow {
            id: Uuid::new_v4(),
            task_id,
            client_id,
            freelancer_id,
            reference: format!("esc_{}", Uuid::new_v4().simple()),
            amount,
            fee,
            status: EscrowStatus::Pending,
            created_at: now,
            funded_at: None,
            settled_at: None,
        };
        for (position, input) in milestones.into_iter().enumerate() {
            let milestone = Milestone {
                id: Uuid::new_v4(),
                escrow_id: escrow.id,
                task_id,
                position: position as u32,
                title: input.title.trim().to_string(),
                amount: input.amount,
                status: MilestoneStatus::Pending,
                dispute_reason: None,
                completed_at: None,
                approved_at: None,
                settled_at: None,
                updated_at: now,
            };
            tables.milestones.insert(milestone.id, milestone);
        }
        tables.escrows.insert(escrow.id, escrow.clone());
        tables.publish(MarketEvent::EscrowInitialized {
            escrow_id: escrow.id,
            task_id,
            amount,
            fee,
            reference: escrow.reference.clone(),
        });
        Ok(Self::view(&tables, escrow))
    }

    /// Mark the escrow behind `reference` funded. `paid` must equal the
    /// escrowed amount plus fee.
    pub fn confirm_funding(&self, reference: &str, paid: Kobo) -> MarketResult<EscrowView> {
        let mut tables = self.store.write();
        let escrow = tables
            .escrows
            .values()
            .find(|e| e.reference == reference)
            .cloned()
            .ok_or_else(|| MarketError::not_found("escrow", reference))?;
        if escrow.status != EscrowStatus::Pending {
            return Err(MarketError::StaleState {
                entity: "escrow",
                id: escrow.id,
                expected: EscrowStatus::Pending.to_string(),
                actual: escrow.status.to_string(),
            });
        }
        if paid != escrow.total_charge() {
            return Err(MarketError::InvalidAmount(format!(
                "paid {paid} does not match escrow charge {}",
                escrow.total_charge()
            )));
        }

        let now = Utc::now();
        for milestone in tables.escrow_milestones(escrow.id) {
            Self::transition(
                &mut tables,
                milestone.id,
                MilestoneAction::Fund,
                None,
                now,
            )?;
        }
        let funded = {
            let record = tables
                .escrows
                .get_mut(&escrow.id)
                .ok_or_else(|| MarketError::not_found("escrow", escrow.id))?;
            record.status = EscrowStatus::Funded;
            record.funded_at = Some(now);
            record.clone()
        };
        tables.publish(MarketEvent::EscrowFunded {
            escrow_id: funded.id,
            task_id: funded.task_id,
            amount: funded.amount,
        });
        Ok(Self::view(&tables, funded))
    }

    pub fn escrow_for_task(&self, task_id: Uuid) -> MarketResult<EscrowView> {
        let tables = self.store.read();
        let escrow = tables
            .escrows
            .values()
            .find(|e| e.task_id == task_id)
            .cloned()
            .ok_or_else(|| MarketError::not_found("escrow for task", task_id))?;
        Ok(Self::view(&tables, escrow))
    }

    pub fn milestones(&self, escrow_id: Uuid) -> MarketResult<Vec<Milestone>> {
        let tables = self.store.read();
        tables.escrow(escrow_id)?;
        Ok(tables.escrow_milestones(escrow_id))
    }

    pub fn milestone(&self, milestone_id: Uuid) -> MarketResult<Milestone> {
        self.store.read().milestone(milestone_id).cloned()
    }

    /// Freelancer submits the work for a funded milestone.
    pub fn complete_milestone(
        &self,
        freelancer_id: Uuid,
        milestone_id: Uuid,
        expected: Option<MilestoneStatus>,
    ) -> MarketResult<Milestone> {
        let mut tables = self.store.write();
        let escrow = Self::milestone_escrow(&tables, milestone_id)?;
        if escrow.freelancer_id != freelancer_id {
            return Err(MarketError::Forbidden(
                "only the hired freelancer can complete a milestone".to_string(),
            ));
        }
        Self::transition(
            &mut tables,
            milestone_id,
            MilestoneAction::Complete,
            expected,
            Utc::now(),
        )
    }

    pub fn approve_milestone(
        &self,
        client_id: Uuid,
        milestone_id: Uuid,
        expected: Option<MilestoneStatus>,
    ) -> MarketResult<Milestone> {
        let mut tables = self.store.write();
        Self::require_escrow_client(&tables, client_id, milestone_id)?;
        Self::transition(
            &mut tables,
            milestone_id,
            MilestoneAction::Approve,
            expected,
            Utc::now(),
        )
    }

    /// Pay an approved milestone into the freelancer's wallet.
    pub fn release_milestone(
        &self,
        client_id: Uuid,
        milestone_id: Uuid,
        expected: Option<MilestoneStatus>,
    ) -> MarketResult<Milestone> {
        let mut tables = self.store.write();
        Self::require_escrow_client(&tables, client_id, milestone_id)?;
        Self::transition(
            &mut tables,
            milestone_id,
            MilestoneAction::Release,
            expected,
            Utc::now(),
        )
    }

    /// Approve a completed milestone and release it in one step.
    pub fn approve_and_release(
        &self,
        client_id: Uuid,
        milestone_id: Uuid,
        expected: Option<MilestoneStatus>,
    ) -> MarketResult<Milestone> {
        let mut tables = self.store.write();
        Self::require_escrow_client(&tables, client_id, milestone_id)?;
        let now = Utc::now();
        Self::transition(
            &mut tables,
            milestone_id,
            MilestoneAction::Approve,
            expected,
            now,
        )?;
        Self::transition(&mut tables, milestone_id, MilestoneAction::Release, None, now)
    }

    /// Either party freezes a completed or approved milestone.
    pub fn dispute_milestone(
        &self,
        user_id: Uuid,
        milestone_id: Uuid,
        reason: &str,
        expected: Option<MilestoneStatus>,
    ) -> MarketResult<Milestone> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(MarketError::Validation("a dispute reason is required".to_string()));
        }
        let mut tables = self.store.write();
        let escrow = Self::milestone_escrow(&tables, milestone_id)?;
        if user_id != escrow.client_id && user_id != escrow.freelancer_id {
            return Err(MarketError::Forbidden(
                "only the client or the freelancer can dispute".to_string(),
            ));
        }
        let milestone = Self::transition(
            &mut tables,
            milestone_id,
            MilestoneAction::Dispute,
            expected,
            Utc::now(),
        )?;
        let record = tables
            .milestones
            .get_mut(&milestone_id)
            .ok_or_else(|| MarketError::not_found("milestone", milestone_id))?;
        record.dispute_reason = Some(reason.to_string());
        Ok(Milestone {
            dispute_reason: Some(reason.to_string()),
            ..milestone
        })
    }

    /// Admin decision on a disputed milestone.
    pub fn resolve_dispute(
        &self,
        milestone_id: Uuid,
        resolution: DisputeResolution,
    ) -> MarketResult<Milestone> {
        let mut tables = self.store.write();
        let now = Utc::now();
        match resolution {
            DisputeResolution::ReleaseToFreelancer => {
                Self::transition(
                    &mut tables,
                    milestone_id,
                    MilestoneAction::ResolveForFreelancer,
                    None,
                    now,
                )?;
                Self::transition(&mut tables, milestone_id, MilestoneAction::Release, None, now)
            }
            DisputeResolution::RefundClient => Self::transition(
                &mut tables,
                milestone_id,
                MilestoneAction::Refund,
                Some(MilestoneStatus::Disputed),
                now,
            ),
        }
    }

    /// Admin refund of a funded (not yet worked) or disputed milestone.
    pub fn refund_milestone(&self, milestone_id: Uuid) -> MarketResult<Milestone> {
        let mut tables = self.store.write();
        Self::transition(
            &mut tables,
            milestone_id,
            MilestoneAction::Refund,
            None,
            Utc::now(),
        )
    }

    /// Approve and release every completed milestone that has waited at
    /// least `after` since completion.
    pub fn auto_release_due(
        &self,
        now: DateTime<Utc>,
        after: Duration,
    ) -> MarketResult<Vec<Milestone>> {
        let mut tables = self.store.write();
        let due: Vec<Uuid> = tables
            .milestones
            .values()
            .filter(|m| m.status == MilestoneStatus::Completed)
            .filter(|m| {
                m.completed_at
                    .and_then(|at| at.checked_add_signed(after))
                    .is_some_and(|due| due <= now)
            })
            .map(|m| m.id)
            .collect();

        let mut released = Vec::with_capacity(due.len());
        for milestone_id in due {
            Self::transition(
                &mut tables,
                milestone_id,
                MilestoneAction::Approve,
                None,
                now,
            )?;
            released.push(Self::transition(
                &mut tables,
                milestone_id,
                MilestoneAction::Release,
                None,
                now,
            )?);
        }
        if !released.is_empty() {
            tracing::info!(count = released.len(), "auto-released milestones");
        }
        Ok(released)
    }

    fn view(tables: &Tables, escrow: Escrow) -> EscrowView {
        EscrowView {
            total_charge: escrow.total_charge(),
            milestones: tables.escrow_milestones(escrow.id),
            escrow,
        }
    }

    fn milestone_escrow(tables: &Tables, milestone_id: Uuid) -> MarketResult<Escrow> {
        let milestone = tables.milestone(milestone_id)?;
        tables.escrow(milestone.escrow_id).cloned()
    }

    fn require_escrow_client(
        tables: &Tables,
        client_id: Uuid,
        milestone_id: Uuid,
    ) -> MarketResult<()> {
        let escrow = Self::milestone_escrow(tables, milestone_id)?;
        if escrow.client_id != client_id {
            return Err(MarketError::Forbidden(
                "only the funding client can approve or release".to_string(),
            ));
        }
        Ok(())
    }

    /// Single compare-and-set step of the milestone state machine, plus its
    /// side effects: wallet credit on release and escrow settlement once every
    /// milestone is terminal.
    fn transition(
        tables: &mut Tables,
        milestone_id: Uuid,
        action: MilestoneAction,
        expected: Option<MilestoneStatus>,
        now: DateTime<Utc>,
    ) -> MarketResult<Milestone> {
        let current = tables.milestone(milestone_id)?.status;
        let expected = expected.or(action.expected_from()).unwrap_or(current);
        let record = tables.milestone_expecting(milestone_id, expected)?;
        let next = action.apply(expected)?;
        record.advance(next, now);
        let milestone = record.clone();

        tables.publish(MarketEvent::MilestoneStatusChanged {
            milestone_id,
            escrow_id: milestone.escrow_id,
            from: expected,
            to: next,
        });

        if next == MilestoneStatus::Released {
            let freelancer_id = tables.escrow(milestone.escrow_id)?.freelancer_id;
            tables.credit(freelancer_id, milestone.amount)?;
        }
        if next.is_terminal() {
            Self::settle_if_done(tables, milestone.escrow_id, now)?;
        }
        Ok(milestone)
    }

    fn settle_if_done(tables: &mut Tables, escrow_id: Uuid, now: DateTime<Utc>) -> MarketResult<()> {
        let milestones = tables.escrow_milestones(escrow_id);
        if !milestones.iter().all(|m| m.status.is_terminal()) {
            return Ok(());
        }
        let released: Kobo = milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Released)
            .map(|m| m.amount)
            .sum();
        let refunded: Kobo = milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Refunded)
            .map(|m| m.amount)
            .sum();

        let task_id = {
            let escrow = tables
                .escrows
                .get_mut(&escrow_id)
                .ok_or_else(|| MarketError::not_found("escrow", escrow_id))?;
            escrow.status = EscrowStatus::Settled;
            escrow.settled_at = Some(now);
            escrow.task_id
        };
        tables.publish(MarketEvent::EscrowSettled {
            escrow_id,
            released,
            refunded,
        });

        let task_status = tables.task(task_id)?.status;
        if task_status == TaskStatus::InProgress {
            let next = if released > 0 {
                TaskStatus::Completed
            } else {
                TaskStatus::Cancelled
            };
            Self::move_task(tables, task_id, TaskStatus::InProgress, next)?;
        } else {
            tracing::warn!(%task_id, status = %task_status, "settled escrow for a task not in progress");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::{active_task, market, verified_user};
    use crate::models::UserType;
    use crate::money::naira;

    struct Hired {
        market: Marketplace,
        client: Uuid,
        freelancer: Uuid,
        task_id: Uuid,
    }

    fn hired() -> Hired {
        let market = market();
        let client = verified_user(&market, UserType::Client);
        let freelancer = verified_user(&market, UserType::Freelancer);
        let task = active_task(&market, client);
        let application = market
            .apply(freelancer, task.id, naira(100_000), None)
            .unwrap();
        market.accept_application(client, application.id).unwrap();
        Hired {
            market,
            client,
            freelancer,
            task_id: task.id,
        }
    }

    fn two_milestones() -> Vec<MilestoneInput> {
        vec![
            MilestoneInput {
                title: "Drafts".to_string(),
                amount: naira(40_000),
            },
            MilestoneInput {
                title: "Final files".to_string(),
                amount: naira(60_000),
            },
        ]
    }

    fn funded(h: &Hired) -> EscrowView {
        let view = h
            .market
            .initialize_funding(h.client, h.task_id, two_milestones())
            .unwrap();
        h.market
            .confirm_funding(&view.escrow.reference, view.total_charge)
            .unwrap()
    }

    #[test]
    fn funding_charges_amount_plus_fee() {
        let h = hired();
        let view = h
            .market
            .initialize_funding(h.client, h.task_id, two_milestones())
            .unwrap();
        assert_eq!(view.escrow.amount, naira(100_000));
        assert_eq!(view.escrow.fee, naira(2_500));
        assert_eq!(view.total_charge, 10_250_000);
        assert_eq!(view.escrow.status, EscrowStatus::Pending);
        assert_eq!(view.milestones.len(), 2);
        assert!(view
            .milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::Pending));
        assert_eq!(view.milestones[0].title, "Drafts");
    }

    #[test]
    fn confirm_funding_requires_exact_charge() {
        let h = hired();
        let view = h
            .market
            .initialize_funding(h.client, h.task_id, two_milestones())
            .unwrap();
        let err = h
            .market
            .confirm_funding(&view.escrow.reference, view.escrow.amount)
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidAmount(_)));

        let view = h
            .market
            .confirm_funding(&view.escrow.reference, view.total_charge)
            .unwrap();
        assert_eq!(view.escrow.status, EscrowStatus::Funded);
        assert!(view
            .milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::Funded));

        // a replayed confirmation changes nothing
        let err = h
            .market
            .confirm_funding(&view.escrow.reference, view.total_charge)
            .unwrap_err();
        assert!(matches!(err, MarketError::StaleState { .. }));
    }

    #[test]
    fn escrow_needs_a_hired_freelancer() {
        let market = market();
        let client = verified_user(&market, UserType::Client);
        let task = active_task(&market, client);
        let err = market
            .initialize_funding(client, task.id, two_milestones())
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[test]
    fn one_escrow_per_task() {
        let h = hired();
        h.market
            .initialize_funding(h.client, h.task_id, two_milestones())
            .unwrap();
        let err = h
            .market
            .initialize_funding(h.client, h.task_id, two_milestones())
            .unwrap_err();
        assert!(matches!(err, MarketError::AlreadyExists(_)));
    }

    #[test]
    fn rejects_empty_or_non_positive_milestones() {
        let h = hired();
        assert!(h
            .market
            .initialize_funding(h.client, h.task_id, Vec::new())
            .is_err());
        let err = h
            .market
            .initialize_funding(
                h.client,
                h.task_id,
                vec![MilestoneInput {
                    title: "Free".into(),
                    amount: 0,
                }],
            )
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidAmount(_)));
    }

    #[test]
    fn full_lifecycle_credits_freelancer_and_completes_task() {
        let h = hired();
        let view = funded(&h);
        for milestone in &view.milestones {
            h.market
                .complete_milestone(h.freelancer, milestone.id, None)
                .unwrap();
            let released = h
                .market
                .approve_and_release(h.client, milestone.id, None)
                .unwrap();
            assert_eq!(released.status, MilestoneStatus::Released);
            assert!(released.settled_at.is_some());
        }

        assert_eq!(h.market.balance(h.freelancer).unwrap(), naira(100_000));
        let view = h.market.escrow_for_task(h.task_id).unwrap();
        assert_eq!(view.escrow.status, EscrowStatus::Settled);
        assert_eq!(
            h.market.task(h.task_id).unwrap().status,
            TaskStatus::Completed
        );
    }

    #[test]
    fn cannot_release_before_approval() {
        let h = hired();
        let view = funded(&h);
        let milestone = &view.milestones[0];

        let err = h
            .market
            .release_milestone(h.client, milestone.id, None)
            .unwrap_err();
        assert!(matches!(err, MarketError::StaleState { .. }));

        h.market
            .complete_milestone(h.freelancer, milestone.id, None)
            .unwrap();
        let err = h
            .market
            .release_milestone(h.client, milestone.id, None)
            .unwrap_err();
        assert!(matches!(err, MarketError::StaleState { .. }));
        assert_eq!(h.market.balance(h.freelancer).unwrap(), 0);

        h.market
            .approve_milestone(h.client, milestone.id, None)
            .unwrap();
        let released = h
            .market
            .release_milestone(h.client, milestone.id, None)
            .unwrap();
        assert_eq!(released.status, MilestoneStatus::Released);
    }

    #[test]
    fn double_release_is_a_conflict_and_pays_once() {
        let h = hired();
        let view = funded(&h);
        let milestone = &view.milestones[0];
        h.market
            .complete_milestone(h.freelancer, milestone.id, None)
            .unwrap();
        h.market
            .approve_and_release(h.client, milestone.id, None)
            .unwrap();

        let err = h
            .market
            .release_milestone(h.client, milestone.id, None)
            .unwrap_err();
        match err {
            MarketError::StaleState {
                expected, actual, ..
            } => {
                assert_eq!(expected, "approved");
                assert_eq!(actual, "released");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.market.balance(h.freelancer).unwrap(), naira(40_000));
    }

    #[test]
    fn caller_expected_status_is_enforced() {
        let h = hired();
        let view = funded(&h);
        let milestone = &view.milestones[0];
        h.market
            .complete_milestone(h.freelancer, milestone.id, None)
            .unwrap();

        // the client last saw it funded; the freelancer has since completed it
        let err = h
            .market
            .dispute_milestone(
                h.client,
                milestone.id,
                "late",
                Some(MilestoneStatus::Funded),
            )
            .unwrap_err();
        assert!(matches!(err, MarketError::StaleState { .. }));
        assert_eq!(
            h.market.milestone(milestone.id).unwrap().status,
            MilestoneStatus::Completed
        );
    }

    #[test]
    fn only_parties_act_on_milestones() {
        let h = hired();
        let view = funded(&h);
        let milestone = &view.milestones[0];
        let stranger = verified_user(&h.market, UserType::Client);

        assert!(matches!(
            h.market.complete_milestone(h.client, milestone.id, None),
            Err(MarketError::Forbidden(_))
        ));
        h.market
            .complete_milestone(h.freelancer, milestone.id, None)
            .unwrap();
        assert!(matches!(
            h.market.approve_and_release(h.freelancer, milestone.id, None),
            Err(MarketError::Forbidden(_))
        ));
        assert!(matches!(
            h.market.dispute_milestone(stranger, milestone.id, "no", None),
            Err(MarketError::Forbidden(_))
        ));
    }

    #[test]
    fn dispute_then_release_to_freelancer() {
        let h = hired();
        let view = funded(&h);
        let milestone = &view.milestones[0];
        h.market
            .complete_milestone(h.freelancer, milestone.id, None)
            .unwrap();
        let disputed = h
            .market
            .dispute_milestone(h.client, milestone.id, "Files missing", None)
            .unwrap();
        assert_eq!(disputed.status, MilestoneStatus::Disputed);
        assert_eq!(disputed.dispute_reason.as_deref(), Some("Files missing"));

        // frozen: the client cannot release it directly
        assert!(h
            .market
            .approve_and_release(h.client, milestone.id, None)
            .is_err());

        let resolved = h
            .market
            .resolve_dispute(milestone.id, DisputeResolution::ReleaseToFreelancer)
            .unwrap();
        assert_eq!(resolved.status, MilestoneStatus::Released);
        assert_eq!(h.market.balance(h.freelancer).unwrap(), naira(40_000));
    }

    #[test]
    fn refunding_everything_cancels_the_task() {
        let h = hired();
        let view = funded(&h);
        let first = &view.milestones[0];
        h.market
            .complete_milestone(h.freelancer, first.id, None)
            .unwrap();
        h.market
            .dispute_milestone(h.freelancer, first.id, "Client unresponsive", None)
            .unwrap();
        h.market
            .resolve_dispute(first.id, DisputeResolution::RefundClient)
            .unwrap();
        h.market.refund_milestone(view.milestones[1].id).unwrap();

        assert_eq!(h.market.balance(h.freelancer).unwrap(), 0);
        let view = h.market.escrow_for_task(h.task_id).unwrap();
        assert_eq!(view.escrow.status, EscrowStatus::Settled);
        assert_eq!(
            h.market.task(h.task_id).unwrap().status,
            TaskStatus::Cancelled
        );
        assert!(h.market.events().iter().any(|e| matches!(
            e,
            MarketEvent::EscrowSettled { released: 0, refunded, .. } if *refunded == naira(100_000)
        )));
    }

    #[test]
    fn auto_release_only_touches_overdue_completed_milestones() {
        let h = hired();
        let view = funded(&h);
        let first = &view.milestones[0];
        let second = &view.milestones[1];
        h.market
            .complete_milestone(h.freelancer, first.id, None)
            .unwrap();

        let now = Utc::now();
        let released = h.market.auto_release_due(now, Duration::days(7)).unwrap();
        assert!(released.is_empty());

        let released = h
            .market
            .auto_release_due(now + Duration::days(8), Duration::days(7))
            .unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, first.id);
        assert_eq!(
            h.market.milestone(second.id).unwrap().status,
            MilestoneStatus::Funded
        );
        assert_eq!(h.market.balance(h.freelancer).unwrap(), naira(40_000));
    }

    #[test]
    fn auto_release_window_past_the_calendar_is_never_due() {
        let h = hired();
        let view = funded(&h);
        h.market
            .complete_milestone(h.freelancer, view.milestones[0].id, None)
            .unwrap();

        let released = h
            .market
            .auto_release_due(Utc::now(), Duration::days(100_000_000))
            .unwrap();
        assert!(released.is_empty());
        assert_eq!(
            h.market.milestone(view.milestones[0].id).unwrap().status,
            MilestoneStatus::Completed
        );
    }

    #[test]
    fn oversized_charge_is_refused_before_anything_is_stored() {
        let h = hired();
        let err = h
            .market
            .initialize_funding(
                h.client,
                h.task_id,
                vec![MilestoneInput {
                    title: "Everything".into(),
                    amount: 9_000_000_000_000_000_000,
                }],
            )
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidAmount(_)));
        assert!(matches!(
            h.market.escrow_for_task(h.task_id),
            Err(MarketError::NotFound { .. })
        ));

        let view = h
            .market
            .initialize_funding(h.client, h.task_id, two_milestones())
            .unwrap();
        assert_eq!(view.total_charge, 10_250_000);
    }
}
