//! Register a new user
//!
//! Three steps: check the user id is unused, publish the public identity
//! document, put the initial encrypted profile. Rolling back removes
//! whatever was already put, so a half-registered user never lingers in the
//! store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::SecretKey;
use crate::process::{
    ExecutionError, Process, ProcessCtx, ProcessStep, RollbackError, RollbackReason, StepOutcome,
};
use crate::profile::{ProfileManager, UserProfile, UserPublicKey};
use crate::store::{content_keys, StoreOps};

/// Scratch space shared by the registration steps
pub struct RegisterContext {
    pub manager: Arc<ProfileManager>,
    pub ops: StoreOps,
    pub user_id: String,
    pub identity: SecretKey,
}

/// Build a ready-to-start registration process.
pub fn register_process(
    manager: Arc<ProfileManager>,
    ops: StoreOps,
    user_id: impl Into<String>,
    identity: SecretKey,
) -> Process<RegisterContext> {
    let context = RegisterContext {
        manager,
        ops,
        user_id: user_id.into(),
        identity,
    };
    let mut process = Process::new("register", context);
    process.add_step(CheckUserExistsStep);
    process.add_step(PutPublicKeyStep::default());
    process.add_step(CreateProfileStep::default());
    process
}

/// Fails registration early when the user id is already taken.
struct CheckUserExistsStep;

#[async_trait]
impl ProcessStep<RegisterContext> for CheckUserExistsStep {
    fn name(&self) -> &str {
        "check-user-exists"
    }

    async fn execute(
        &mut self,
        ctx: &mut ProcessCtx<RegisterContext>,
    ) -> Result<StepOutcome<RegisterContext>, ExecutionError> {
        // A cached read is fine for a pure existence check; an actual
        // collision still gets caught by the store's CAS guard on put
        if ctx.manager.try_get_profile(true).await?.is_some() {
            return Err(ExecutionError::Invalid(format!(
                "user id '{}' is already taken",
                ctx.user_id
            )));
        }
        Ok(StepOutcome::Continue)
    }
}

/// Publishes the user's public identity document in the clear.
#[derive(Default)]
struct PutPublicKeyStep {
    put: bool,
}

#[async_trait]
impl ProcessStep<RegisterContext> for PutPublicKeyStep {
    fn name(&self) -> &str {
        "put-public-key"
    }

    async fn execute(
        &mut self,
        ctx: &mut ProcessCtx<RegisterContext>,
    ) -> Result<StepOutcome<RegisterContext>, ExecutionError> {
        let document = UserPublicKey {
            user_id: ctx.user_id.clone(),
            public_key: ctx.identity.public(),
        };
        let payload = bincode::serialize(&document)?;
        let addr = ctx.manager.addr();

        ctx.ops
            .put_plain(
                &addr,
                content_keys::USER_PUBLIC_KEY,
                payload,
                None,
                ctx.manager.protection(),
            )
            .await?;

        self.put = true;
        tracing::debug!("published public key for '{}'", ctx.user_id);
        Ok(StepOutcome::Continue)
    }

    async fn rollback(
        &mut self,
        ctx: &mut ProcessCtx<RegisterContext>,
        _reason: &RollbackReason,
    ) -> Result<(), RollbackError> {
        if self.put {
            let addr = ctx.manager.addr();
            ctx.ops
                .remove(&addr, content_keys::USER_PUBLIC_KEY, ctx.manager.protection())
                .await
                .map_err(|error| RollbackError::new(self.name(), error))?;
            self.put = false;
        }
        Ok(())
    }
}

/// Puts the very first version of the user's encrypted profile.
#[derive(Default)]
struct CreateProfileStep {
    created: bool,
}

#[async_trait]
impl ProcessStep<RegisterContext> for CreateProfileStep {
    fn name(&self) -> &str {
        "create-profile"
    }

    async fn execute(
        &mut self,
        ctx: &mut ProcessCtx<RegisterContext>,
    ) -> Result<StepOutcome<RegisterContext>, ExecutionError> {
        let profile = UserProfile::new(&ctx.user_id, ctx.identity.public());
        ctx.manager.create(&profile).await?;
        self.created = true;
        tracing::info!("registered user '{}'", ctx.user_id);
        Ok(StepOutcome::Continue)
    }

    async fn rollback(
        &mut self,
        ctx: &mut ProcessCtx<RegisterContext>,
        _reason: &RollbackReason,
    ) -> Result<(), RollbackError> {
        if self.created {
            let addr = ctx.manager.addr();
            ctx.ops
                .remove(&addr, content_keys::USER_PROFILE, ctx.manager.protection())
                .await
                .map_err(|error| RollbackError::new(self.name(), error))?;
            self.created = false;
        }
        Ok(())
    }
}
