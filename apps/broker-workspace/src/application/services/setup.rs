//! Session setup: flags, environment, assembly.

use std::sync::Arc;

use crate::application::error::AssemblyError;
use crate::application::ports::Session;
use crate::application::services::assembler::{
    AssemblyPlan, AssemblySummary, SubscriptionAssembler,
};
use crate::application::services::environment::Environment;

/// Apply the plan's session flags, build an environment and assemble it.
///
/// The environment is returned whatever the assembly outcome; bindings made
/// before a failure stay in place. Callers decide whether the error is fatal.
pub async fn setup(
    session: Arc<dyn Session>,
    plan: &AssemblyPlan,
) -> (Environment, Result<AssemblySummary, AssemblyError>) {
    session.set_frozen(plan.frozen);
    tracing::debug!(frozen = plan.frozen, "Session flags applied");

    let env = Environment::new(session);
    let result = SubscriptionAssembler::new(&env, plan).assemble().await;
    (env, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{BrokerError, MockSession};

    #[tokio::test]
    async fn frozen_flag_applied_before_assembly() {
        let mut seq = mockall::Sequence::new();
        let mut session = MockSession::new();
        session
            .expect_set_frozen()
            .with(mockall::predicate::eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        session
            .expect_securities()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Vec::new()));

        let plan = AssemblyPlan {
            frozen: true,
            securities: vec!["NOTHING".to_string()],
            ..AssemblyPlan::default()
        };

        let (env, result) = setup(Arc::new(session), &plan).await;

        assert_eq!(result.unwrap().securities, 0);
        assert!(env.is_empty());
    }

    #[tokio::test]
    async fn environment_survives_assembly_failure() {
        let mut session = MockSession::new();
        session.expect_set_frozen().return_const(());
        session
            .expect_curve()
            .returning(|symbol| Err(BrokerError::NotFound(symbol.to_string())));

        let plan = AssemblyPlan {
            curves: vec!["EUR".to_string()],
            ..AssemblyPlan::default()
        };

        let (env, result) = setup(Arc::new(session), &plan).await;

        assert!(result.is_err());
        assert!(env.is_empty());
    }
}
