//! The marketplace service: users, tasks and applications.
//!
//! Escrow, withdrawal, PIN and webhook operations are further `impl` blocks on
//! [`Marketplace`] in their own modules.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::events::MarketEvent;
use crate::fees::{EscrowFeeSchedule, WithdrawalFeeSchedule};
use crate::models::{
    Application, ApplicationStatus, KycStatus, Task, TaskStatus, User, UserType,
};
use crate::money::{naira, Kobo};
use crate::pin::{PinCost, PinHasher};
use crate::store::{MemoryStore, Tables};
use crate::withdrawal::{AccountNameLookup, StaticAccountDirectory};

/// Business rules the marketplace runs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSettings {
    pub withdrawal_fees: WithdrawalFeeSchedule,
    pub escrow_fees: EscrowFeeSchedule,
    pub min_withdrawal: Kobo,
    pub pin_cost: PinCost,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            withdrawal_fees: WithdrawalFeeSchedule::default(),
            escrow_fees: EscrowFeeSchedule::default(),
            min_withdrawal: naira(1_000),
            pin_cost: PinCost::default(),
        }
    }
}

impl MarketSettings {
    pub fn validate(&self) -> MarketResult<()> {
        self.withdrawal_fees.validate()?;
        if self.escrow_fees.fee_bps > crate::money::BPS_SCALE {
            return Err(MarketError::Validation(format!(
                "escrow fee_bps {} exceeds {}",
                self.escrow_fees.fee_bps,
                crate::money::BPS_SCALE
            )));
        }
        if self.min_withdrawal <= 0 {
            return Err(MarketError::Validation(
                "min_withdrawal must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct Marketplace {
    pub(crate) store: MemoryStore,
    pub(crate) settings: MarketSettings,
    pub(crate) pins: PinHasher,
    pub(crate) accounts: Arc<dyn AccountNameLookup>,
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Fields a client supplies when posting a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget_min: Kobo,
    pub budget_max: Kobo,
    #[serde(default)]
    pub publish: bool,
}

impl Marketplace {
    pub fn new(settings: MarketSettings) -> MarketResult<Self> {
        Self::with_account_lookup(settings, Arc::new(StaticAccountDirectory::default()))
    }

    pub fn with_account_lookup(
        settings: MarketSettings,
        accounts: Arc<dyn AccountNameLookup>,
    ) -> MarketResult<Self> {
        settings.validate()?;
        let pins = PinHasher::new(settings.pin_cost)?;
        Ok(Self {
            store: MemoryStore::new(),
            settings,
            pins,
            accounts,
        })
    }

    pub fn settings(&self) -> &MarketSettings {
        &self.settings
    }

    /// Recently published events, oldest first. At most
    /// [`EVENT_LOG_CAPACITY`](crate::EVENT_LOG_CAPACITY) are kept.
    pub fn events(&self) -> Vec<MarketEvent> {
        self.store.read().events.iter().cloned().collect()
    }

    // ---- users ----

    pub fn signup(&self, email: &str, user_type: UserType) -> MarketResult<User> {
        let email = email.trim().to_lowercase();
        if email.len() < 3 || !email.contains('@') {
            return Err(MarketError::Validation(format!("invalid email: {email}")));
        }

        let mut tables = self.store.write();
        if tables.users.values().any(|u| u.email == email) {
            return Err(MarketError::AlreadyExists(format!("user {email}")));
        }
        let user = User::new(email, user_type, Utc::now());
        tables.users.insert(user.id, user.clone());
        tables.publish(MarketEvent::UserSignedUp { user_id: user.id });
        Ok(user)
    }

    pub fn user(&self, user_id: Uuid) -> MarketResult<User> {
        self.store.read().user(user_id).cloned()
    }

    /// Admin override of a user's verification state.
    pub fn set_verification(
        &self,
        user_id: Uuid,
        kyc_status: KycStatus,
        dojah_verified: Option<bool>,
    ) -> MarketResult<User> {
        let mut tables = self.store.write();
        let user = Self::apply_verification(&mut tables, user_id, kyc_status)?;
        if let Some(dojah) = dojah_verified {
            let user = tables.user_mut(user_id)?;
            user.dojah_verified = dojah;
            return Ok(user.clone());
        }
        Ok(user)
    }

    pub(crate) fn apply_verification(
        tables: &mut Tables,
        user_id: Uuid,
        kyc_status: KycStatus,
    ) -> MarketResult<User> {
        let user = tables.user_mut(user_id)?;
        user.kyc_status = kyc_status;
        user.is_verified = kyc_status == KycStatus::Verified;
        let user = user.clone();
        tables.publish(MarketEvent::VerificationUpdated {
            user_id,
            kyc_status,
            is_verified: user.is_verified,
        });
        Ok(user)
    }

    // ---- tasks ----

    pub fn create_task(&self, client_id: Uuid, input: NewTask) -> MarketResult<Task> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(MarketError::Validation("task title is required".to_string()));
        }
        if input.budget_min <= 0 || input.budget_min > input.budget_max {
            return Err(MarketError::InvalidAmount(format!(
                "budget range {}..{} is invalid",
                input.budget_min, input.budget_max
            )));
        }

        let mut tables = self.store.write();
        let client = tables.user(client_id)?;
        if client.user_type != UserType::Client {
            return Err(MarketError::Forbidden("only clients can post tasks".to_string()));
        }

        let task = Task {
            id: Uuid::new_v4(),
            client_id,
            title,
            description: input.description,
            budget_min: input.budget_min,
            budget_max: input.budget_max,
            status: if input.publish {
                TaskStatus::Active
            } else {
                TaskStatus::Draft
            },
            applications_count: 0,
            freelancer_id: None,
            created_at: Utc::now(),
        };
        tables.tasks.insert(task.id, task.clone());
        tables.publish(MarketEvent::TaskCreated {
            task_id: task.id,
            client_id,
        });
        Ok(task)
    }

    pub fn task(&self, task_id: Uuid) -> MarketResult<Task> {
        self.store.read().task(task_id).cloned()
    }

    pub fn publish_task(&self, client_id: Uuid, task_id: Uuid) -> MarketResult<Task> {
        let mut tables = self.store.write();
        Self::owned_task(&tables, client_id, task_id)?;
        Self::move_task(&mut tables, task_id, TaskStatus::Draft, TaskStatus::Active)
    }

    pub fn cancel_task(&self, client_id: Uuid, task_id: Uuid) -> MarketResult<Task> {
        let mut tables = self.store.write();
        let task = Self::owned_task(&tables, client_id, task_id)?;
        let from = task.status;
        if !matches!(from, TaskStatus::Draft | TaskStatus::Active) {
            return Err(MarketError::InvalidTransition {
                entity: "task",
                action: "cancel",
                from: from.to_string(),
            });
        }
        let task = Self::move_task(&mut tables, task_id, from, TaskStatus::Cancelled)?;
        Self::close_open_applications(&mut tables, task_id, None);
        Ok(task)
    }

    fn owned_task(tables: &Tables, client_id: Uuid, task_id: Uuid) -> MarketResult<Task> {
        let task = tables.task(task_id)?;
        if task.client_id != client_id {
            return Err(MarketError::Forbidden("not the owner of this task".to_string()));
        }
        Ok(task.clone())
    }

    /// Compare-and-set on task status.
    pub(crate) fn move_task(
        tables: &mut Tables,
        task_id: Uuid,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> MarketResult<Task> {
        let task = tables.task_mut(task_id)?;
        if task.status != expected {
            return Err(MarketError::StaleState {
                entity: "task",
                id: task_id,
                expected: expected.to_string(),
                actual: task.status.to_string(),
            });
        }
        if !expected.can_transition_to(next) {
            return Err(MarketError::InvalidTransition {
                entity: "task",
                action: next.as_str(),
                from: expected.to_string(),
            });
        }
        task.status = next;
        let task = task.clone();
        tables.publish(MarketEvent::TaskStatusChanged {
            task_id,
            status: next,
        });
        Ok(task)
    }

    // ---- applications ----

    pub fn apply(
        &self,
        freelancer_id: Uuid,
        task_id: Uuid,
        proposed_budget: Kobo,
        cover_letter: Option<String>,
    ) -> MarketResult<Application> {
        if proposed_budget <= 0 {
            return Err(MarketError::InvalidAmount(format!(
                "proposed budget must be positive, got {proposed_budget}"
            )));
        }

        let mut tables = self.store.write();
        let freelancer = tables.verified_user(freelancer_id)?;
        if freelancer.user_type != UserType::Freelancer {
            return Err(MarketError::Forbidden(
                "only freelancers can apply to tasks".to_string(),
            ));
        }
        let task = tables.task(task_id)?;
        if task.client_id == freelancer_id {
            return Err(MarketError::Forbidden("cannot apply to your own task".to_string()));
        }
        if task.status != TaskStatus::Active {
            return Err(MarketError::Validation(format!(
                "task is {} and not accepting applications",
                task.status
            )));
        }
        let duplicate = tables.applications.values().any(|a| {
            a.task_id == task_id && a.freelancer_id == freelancer_id && a.status.is_open()
        });
        if duplicate {
            return Err(MarketError::AlreadyExists(
                "an open application for this task".to_string(),
            ));
        }

        let application = Application {
            id: Uuid::new_v4(),
            task_id,
            freelancer_id,
            proposed_budget,
            cover_letter,
            status: ApplicationStatus::Pending,
            created_at: Utc::now(),
        };
        tables
            .applications
            .insert(application.id, application.clone());
        tables.task_mut(task_id)?.applications_count += 1;
        tables.publish(MarketEvent::ApplicationSubmitted {
            application_id: application.id,
            task_id,
            freelancer_id,
        });
        Ok(application)
    }

    pub fn application(&self, application_id: Uuid) -> MarketResult<Application> {
        self.store.read().application(application_id).cloned()
    }

    pub fn shortlist_application(
        &self,
        client_id: Uuid,
        application_id: Uuid,
    ) -> MarketResult<Application> {
        let mut tables = self.store.write();
        let application = tables.application(application_id)?.clone();
        Self::owned_task(&tables, client_id, application.task_id)?;
        Self::move_application(
            &mut tables,
            application_id,
            &[ApplicationStatus::Pending],
            ApplicationStatus::Interviewing,
        )
    }

    /// Accept one application: the task goes in progress with this freelancer
    /// and every other open application on it is rejected.
    pub fn accept_application(
        &self,
        client_id: Uuid,
        application_id: Uuid,
    ) -> MarketResult<Application> {
        let mut tables = self.store.write();
        let application = tables.application(application_id)?.clone();
        let task = Self::owned_task(&tables, client_id, application.task_id)?;
        if task.status != TaskStatus::Active {
            return Err(MarketError::InvalidTransition {
                entity: "task",
                action: "accept an application for",
                from: task.status.to_string(),
            });
        }

        let accepted = Self::move_application(
            &mut tables,
            application_id,
            &[ApplicationStatus::Pending, ApplicationStatus::Interviewing],
            ApplicationStatus::Accepted,
        )?;
        Self::move_task(&mut tables, task.id, TaskStatus::Active, TaskStatus::InProgress)?;
        tables.task_mut(task.id)?.freelancer_id = Some(application.freelancer_id);
        Self::close_open_applications(&mut tables, task.id, Some(application_id));
        Ok(accepted)
    }

    pub fn reject_application(
        &self,
        client_id: Uuid,
        application_id: Uuid,
    ) -> MarketResult<Application> {
        let mut tables = self.store.write();
        let application = tables.application(application_id)?.clone();
        Self::owned_task(&tables, client_id, application.task_id)?;
        Self::move_application(
            &mut tables,
            application_id,
            &[ApplicationStatus::Pending, ApplicationStatus::Interviewing],
            ApplicationStatus::Rejected,
        )
    }

    /// Applicant pulls their own application.
    pub fn withdraw_application(
        &self,
        freelancer_id: Uuid,
        application_id: Uuid,
    ) -> MarketResult<Application> {
        let mut tables = self.store.write();
        let application = tables.application(application_id)?;
        if application.freelancer_id != freelancer_id {
            return Err(MarketError::Forbidden(
                "only the applicant can withdraw an application".to_string(),
            ));
        }
        Self::move_application(
            &mut tables,
            application_id,
            &[ApplicationStatus::Pending, ApplicationStatus::Interviewing],
            ApplicationStatus::Withdrawn,
        )
    }

    fn move_application(
        tables: &mut Tables,
        application_id: Uuid,
        expected: &[ApplicationStatus],
        next: ApplicationStatus,
    ) -> MarketResult<Application> {
        let application = tables
            .applications
            .get_mut(&application_id)
            .ok_or_else(|| MarketError::not_found("application", application_id))?;
        if !expected.contains(&application.status) {
            return Err(MarketError::InvalidTransition {
                entity: "application",
                action: next.as_str(),
                from: application.status.to_string(),
            });
        }
        application.status = next;
        let application = application.clone();
        tables.publish(MarketEvent::ApplicationStatusChanged {
            application_id,
            status: next,
        });
        Ok(application)
    }

    fn close_open_applications(tables: &mut Tables, task_id: Uuid, keep: Option<Uuid>) {
        let open: Vec<Uuid> = tables
            .applications
            .values()
            .filter(|a| a.task_id == task_id && a.status.is_open() && Some(a.id) != keep)
            .map(|a| a.id)
            .collect();
        for id in open {
            if let Some(application) = tables.applications.get_mut(&id) {
                application.status = ApplicationStatus::Rejected;
            }
            tables.publish(MarketEvent::ApplicationStatusChanged {
                application_id: id,
                status: ApplicationStatus::Rejected,
            });
        }
    }
}
