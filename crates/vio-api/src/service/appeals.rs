//! Appeal filing, conversation and review.
//!
//! Review actions are computed by the appeal state machine in `vio-state`
//! and persisted as one unit of work: the appeal status change, its log row,
//! the optional reviewer comment and, on approval or rejection, the cascaded
//! violation status change with its own log row.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use vio_core::{FileType, Principal, ReasonCode, Role, Scope};
use vio_state::{AppealAction, AppealStatus, AppealTransition};

use super::{non_blank, ServiceError, MIN_REASON_CHARS};
use crate::model::{
    Appeal, AppealAttachment, AppealComment, AppealDetail, AppealStatusLog, AppealView,
    ViolationStatusLog,
};
use crate::scope::resolve_scope;
use crate::store::{AppealChange, AppealFilter, NewComment, Store, ViolationChange};

/// Enum-valued fields arrive as the caller sent them. They are parsed only
/// after the caller's right to act on the target has been checked, so an
/// unknown value never masks a 403, 404 or 409.
#[derive(Debug, Clone)]
pub struct AttachmentInput {
    pub file_url: String,
    pub file_type: String,
}

#[derive(Debug, Clone)]
pub struct NewAppealInput {
    pub reason_code: String,
    pub reason_text: String,
    pub attachments: Vec<AttachmentInput>,
}

#[derive(Debug, Clone)]
pub struct CommentInput {
    pub message: String,
    pub attachments: Vec<AttachmentInput>,
}

/// A reviewer action. `message` is required for [`AppealAction::RequestInfo`]
/// and recorded as a reviewer comment whenever it is non-blank.
#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub action: AppealAction,
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct AppealService {
    store: Arc<dyn Store>,
    max_attachments: usize,
}

impl AppealService {
    pub fn new(store: Arc<dyn Store>, max_attachments: usize) -> Self {
        Self {
            store,
            max_attachments,
        }
    }

    /// Appeals visible to `principal`, newest first. Landfill administrators
    /// only ever see camera-error appeals.
    pub async fn list(
        &self,
        principal: &Principal,
        mut filter: AppealFilter,
    ) -> Result<Vec<AppealView>, ServiceError> {
        let scope = resolve_scope(self.store.as_ref(), principal).await?;
        if scope == Scope::Technical {
            filter.reason_codes = vec![ReasonCode::CameraError];
        }
        Ok(self.store.list_appeals(&scope, &filter).await?)
    }

    pub async fn get(
        &self,
        principal: &Principal,
        appeal_id: Uuid,
    ) -> Result<AppealDetail, ServiceError> {
        let scope = resolve_scope(self.store.as_ref(), principal).await?;
        self.load(&scope, appeal_id).await
    }

    /// File an appeal against a violation. Only the trip's driver or the
    /// trip's contractor may appeal, and only while no other appeal on the
    /// violation is active.
    pub async fn create(
        &self,
        principal: &Principal,
        violation_id: Uuid,
        input: NewAppealInput,
    ) -> Result<AppealDetail, ServiceError> {
        if !principal.role.is_appellant() {
            return Err(ServiceError::PermissionDenied(format!(
                "role {} cannot file appeals",
                principal.role
            )));
        }
        let scope = resolve_scope(self.store.as_ref(), principal).await?;
        let record = self
            .store
            .get_violation(&scope, violation_id)
            .await?
            .ok_or(ServiceError::NotFound("violation"))?;

        let facts = record.attribution();
        let owns = match principal.role {
            Role::Driver => principal.is_driver_of(facts.driver_id),
            Role::ContractorAdmin => principal.is_contractor_of(facts.contractor_id),
            _ => false,
        };
        if !owns {
            return Err(ServiceError::PermissionDenied(
                "only the trip's driver or contractor may appeal".to_string(),
            ));
        }

        if self.store.count_active(violation_id).await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "violation {violation_id} already has an active appeal"
            )));
        }

        let reason_code: ReasonCode = input.reason_code.parse()?;
        let reason_text = input.reason_text.trim().to_string();
        if reason_text.chars().count() < MIN_REASON_CHARS {
            return Err(ServiceError::InvalidInput(format!(
                "reason_text must be at least {MIN_REASON_CHARS} characters"
            )));
        }

        let now = Utc::now();
        let appeal_id = Uuid::new_v4();
        let attachments = self.attachments(appeal_id, principal, input.attachments, now)?;

        let appeal = Appeal {
            id: appeal_id,
            violation_id,
            trip_id: record.violation.trip_id,
            ticket_id: record.ticket.as_ref().map(|t| t.id),
            driver_id: facts.driver_id,
            contractor_id: facts.contractor_id,
            reason_code,
            reason_text: reason_text.clone(),
            status: AppealStatus::Submitted,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        let opening = NewComment {
            comment: comment(appeal_id, principal, reason_text.clone(), now),
            attachments,
        };
        let log = AppealStatusLog {
            id: Uuid::new_v4(),
            appeal_id,
            old_status: None,
            new_status: AppealStatus::Submitted,
            note: Some(reason_text),
            changed_by: Some(principal.user_id),
            created_at: now,
        };
        self.store.create_appeal(&appeal, &opening, &log).await?;

        metrics::counter!("appeals_created_total", "reason_code" => appeal.reason_code.as_str())
            .increment(1);
        tracing::info!(
            appeal_id = %appeal_id,
            violation_id = %violation_id,
            actor = %principal.user_id,
            reason_code = %appeal.reason_code,
            "appeal filed"
        );

        self.load(&scope, appeal_id).await
    }

    /// Post a comment. A participant reply on a NEED_INFO appeal puts it
    /// back under review in the same unit of work.
    pub async fn add_comment(
        &self,
        principal: &Principal,
        appeal_id: Uuid,
        input: CommentInput,
    ) -> Result<(), ServiceError> {
        let scope = resolve_scope(self.store.as_ref(), principal).await?;
        let detail = self.load(&scope, appeal_id).await?;

        let participant = is_participant(principal, &detail.appeal);
        let staff = matches!(
            principal.role,
            Role::CityAuthority | Role::OversightBody | Role::LandfillAdmin
        );
        if !participant && !staff {
            return Err(ServiceError::PermissionDenied(
                "not a participant of this appeal".to_string(),
            ));
        }

        let message = non_blank(Some(&input.message))
            .ok_or_else(|| ServiceError::InvalidInput("message must not be empty".to_string()))?;
        let now = Utc::now();
        let attachments = self.attachments(appeal_id, principal, input.attachments, now)?;
        let new_comment = NewComment {
            comment: comment(appeal_id, principal, message, now),
            attachments,
        };

        let reopen = if participant {
            detail
                .appeal
                .status
                .after_participant_reply()
                .map(|t| appeal_change(appeal_id, principal, &t, now))
        } else {
            None
        };

        self.store
            .add_comment(&new_comment, reopen.as_ref())
            .await?;

        if let Some(change) = &reopen {
            record_transition(appeal_id, principal, change.from, change.to);
        }
        Ok(())
    }

    /// Apply a reviewer action.
    pub async fn act(
        &self,
        principal: &Principal,
        appeal_id: Uuid,
        input: ReviewInput,
    ) -> Result<(), ServiceError> {
        if !principal.role.is_reviewer() {
            return Err(ServiceError::PermissionDenied(format!(
                "role {} cannot review appeals",
                principal.role
            )));
        }
        let scope = resolve_scope(self.store.as_ref(), principal).await?;
        let detail = self.load(&scope, appeal_id).await?;

        let transition = detail.appeal.status.apply(input.action)?;
        let message = non_blank(input.message.as_deref());
        if input.action.requires_message() && message.is_none() {
            return Err(ServiceError::InvalidInput(format!(
                "action {} requires a message",
                input.action
            )));
        }

        let now = Utc::now();
        let change = appeal_change(appeal_id, principal, &transition, now);

        let cascade = match transition.cascade {
            Some(cascade) => {
                let from = detail.violation.status;
                let to = from.transition_to(cascade.to)?;
                Some(ViolationChange {
                    violation_id: detail.violation.id,
                    from,
                    to,
                    description: Some(cascade.note.to_string()),
                    log: ViolationStatusLog {
                        id: Uuid::new_v4(),
                        violation_id: detail.violation.id,
                        old_status: Some(from),
                        new_status: to,
                        note: Some(cascade.note.to_string()),
                        changed_by: Some(principal.user_id),
                        created_at: now,
                    },
                })
            }
            None => None,
        };

        let note = message.map(|m| NewComment {
            comment: comment(appeal_id, principal, m, now),
            attachments: Vec::new(),
        });

        self.store
            .apply_transition(&change, cascade.as_ref(), note.as_ref())
            .await?;

        record_transition(appeal_id, principal, transition.from, transition.to);
        if let Some(cascade) = &cascade {
            tracing::info!(
                violation_id = %cascade.violation_id,
                appeal_id = %appeal_id,
                from = %cascade.from,
                to = %cascade.to,
                "violation status cascaded from appeal"
            );
        }
        Ok(())
    }

    async fn load(&self, scope: &Scope, appeal_id: Uuid) -> Result<AppealDetail, ServiceError> {
        self.store
            .get_appeal(scope, appeal_id)
            .await?
            .ok_or(ServiceError::NotFound("appeal"))
    }

    fn attachments(
        &self,
        appeal_id: Uuid,
        principal: &Principal,
        inputs: Vec<AttachmentInput>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AppealAttachment>, ServiceError> {
        if inputs.len() > self.max_attachments {
            return Err(ServiceError::InvalidInput(format!(
                "at most {} attachments are allowed",
                self.max_attachments
            )));
        }
        inputs
            .into_iter()
            .map(|input| {
                let file_url = non_blank(Some(&input.file_url)).ok_or_else(|| {
                    ServiceError::InvalidInput("attachment file_url must not be empty".to_string())
                })?;
                let file_type: FileType = input.file_type.parse()?;
                Ok(AppealAttachment {
                    id: Uuid::new_v4(),
                    appeal_id,
                    file_url,
                    file_type,
                    uploaded_by: principal.user_id,
                    created_at: now,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for AppealService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppealService")
            .field("max_attachments", &self.max_attachments)
            .finish_non_exhaustive()
    }
}

/// The driver or contractor captured on the appeal when it was filed.
fn is_participant(principal: &Principal, appeal: &Appeal) -> bool {
    principal.is_driver_of(appeal.driver_id) || principal.is_contractor_of(appeal.contractor_id)
}

fn comment(
    appeal_id: Uuid,
    principal: &Principal,
    message: String,
    now: DateTime<Utc>,
) -> AppealComment {
    AppealComment {
        id: Uuid::new_v4(),
        appeal_id,
        author_id: principal.user_id,
        author_role: principal.role,
        message,
        created_at: now,
    }
}

fn appeal_change(
    appeal_id: Uuid,
    principal: &Principal,
    transition: &AppealTransition,
    now: DateTime<Utc>,
) -> AppealChange {
    let stamped = transition.stamps_resolution();
    AppealChange {
        appeal_id,
        from: transition.from,
        to: transition.to,
        resolved_by: stamped.then_some(principal.user_id),
        resolved_at: stamped.then_some(now),
        log: AppealStatusLog {
            id: Uuid::new_v4(),
            appeal_id,
            old_status: Some(transition.from),
            new_status: transition.to,
            note: Some(transition.note.to_string()),
            changed_by: Some(principal.user_id),
            created_at: now,
        },
    }
}

fn record_transition(appeal_id: Uuid, principal: &Principal, from: AppealStatus, to: AppealStatus) {
    metrics::counter!("appeal_transitions_total", "to" => to.as_str()).increment(1);
    tracing::info!(
        appeal_id = %appeal_id,
        actor = %principal.user_id,
        from = %from,
        to = %to,
        "appeal status changed"
    );
}
