//! # Dispatch Flows
//!
//! How committing transactions reach modules:
//!
//! 1. **Shared view**: modules see the same lazily computed transaction
//! 2. **Write-through**: a later module sees writes made by an earlier one
//! 3. **Veto**: a failing or rolling-back module rejects the whole commit
//! 4. **Guard**: illegal transactions never reach any module
//! 5. **Capability filter**: each runtime only drives its own modules

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use runtime_telemetry::{encode_metrics, register_metrics, COMMITS_TOTAL};
    use shared_types::PropertyValue;
    use tx_runtime::{
        InMemoryMetadataRepository, ModuleCapability, RuntimeConfig, RuntimeError, TxDrivenRuntime,
    };

    use crate::harness::{
        init_test_logging, new_trace, EnricherModule, GraphKernel, Reaction, RecordingModule,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn runtime(name: &str) -> Arc<TxDrivenRuntime> {
        Arc::new(
            TxDrivenRuntime::new(
                RuntimeConfig::named(name),
                Arc::new(InMemoryMetadataRepository::new()),
            )
            .unwrap(),
        )
    }

    fn kernel_with(runtime: &Arc<TxDrivenRuntime>) -> Arc<GraphKernel> {
        let kernel = GraphKernel::new();
        kernel.register_handler(runtime.clone());
        kernel
    }

    // =============================================================================
    // DISPATCH
    // =============================================================================

    #[test]
    fn test_modules_run_in_registration_order() {
        init_test_logging();
        let trace = new_trace();
        let runtime = runtime("ordering");
        for id in ["first", "second", "third"] {
            runtime
                .register_module(Arc::new(RecordingModule::new(id, &trace)))
                .unwrap();
        }
        runtime.start().unwrap();
        trace.lock().clear();

        kernel_with(&runtime)
            .execute(|cs| cs.create_node(["Person"]))
            .unwrap();

        assert_eq!(*trace.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_logger_and_enricher_share_one_transaction() {
        init_test_logging();
        let trace = new_trace();
        let runtime = runtime("enrich");
        let logger = Arc::new(RecordingModule::new("logger", &trace));
        let enricher = Arc::new(EnricherModule::new("enricher", &trace, "reviewed", true));
        let auditor = Arc::new(RecordingModule::new("auditor", &trace));
        runtime.register_module(logger.clone()).unwrap();
        runtime.register_module(enricher.clone()).unwrap();
        runtime.register_module(auditor.clone()).unwrap();
        let kernel = kernel_with(&runtime);
        runtime.start().unwrap();
        trace.lock().clear();

        let id = kernel
            .execute(|cs| {
                let id = cs.create_node(["Person"]);
                cs.set_node_property(id, "name", "Ada").unwrap();
                id
            })
            .unwrap();

        // Created-node facet is computed once, before the enricher wrote.
        let logged = logger.observed.lock()[0].clone();
        let audited = auditor.observed.lock()[0].clone();
        assert_eq!(logged, audited);
        assert_eq!(logged[0].id, id);
        assert!(!logged[0].properties.contains_key("reviewed"));

        // Reading through the host shows the enricher's own write.
        let enriched = enricher.observed.lock()[0].clone();
        assert_eq!(enriched.properties.get("reviewed"), Some(&PropertyValue::Bool(true)));

        // And it is committed.
        let committed = kernel.node(id).unwrap();
        assert_eq!(committed.properties.get("reviewed"), Some(&PropertyValue::Bool(true)));
        assert_eq!(trace.lock().as_slice(), ["logger", "enricher", "auditor"]);
    }

    #[test]
    fn test_failing_module_rejects_commit() {
        init_test_logging();
        let trace = new_trace();
        let runtime = runtime("veto");
        let first = Arc::new(RecordingModule::new("first", &trace));
        let failing = Arc::new(
            RecordingModule::new("failing", &trace).reacting(Reaction::Fail("disk full".to_string())),
        );
        let last = Arc::new(RecordingModule::new("last", &trace));
        runtime.register_module(first.clone()).unwrap();
        runtime.register_module(failing.clone()).unwrap();
        runtime.register_module(last.clone()).unwrap();
        let kernel = kernel_with(&runtime);

        let err = kernel.execute(|cs| cs.create_node(["Person"])).unwrap_err();

        match err {
            RuntimeError::ModuleDispatchFailure { module, .. } => assert_eq!(module, "failing"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(kernel.node_count(), 0);
        assert_eq!(first.dispatch_count(), 1);
        assert_eq!(last.dispatch_count(), 0);

        // The runtime stays usable once the module recovers.
        failing.set_reaction(Reaction::Accept);
        kernel.execute(|cs| cs.create_node(["Person"])).unwrap();
        assert_eq!(kernel.node_count(), 1);
        assert_eq!(last.dispatch_count(), 1);
    }

    #[test]
    fn test_deliberate_rollback_rejects_commit() {
        let trace = new_trace();
        let runtime = runtime("rollback");
        let module = Arc::new(
            RecordingModule::new("policy", &trace)
                .reacting(Reaction::Rollback("orphan relationship".to_string())),
        );
        runtime.register_module(module).unwrap();
        let kernel = kernel_with(&runtime);

        let err = kernel.execute(|cs| cs.create_node(["Person"])).unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::TransactionRolledBack { ref reason, .. } if reason == "orphan relationship"
        ));
        assert!(err.is_transaction_scoped());
        assert_eq!(kernel.node_count(), 0);
    }

    #[test]
    fn test_illegal_transaction_never_reaches_modules() {
        init_test_logging();
        let trace = new_trace();
        let runtime = runtime("guard");
        let module = Arc::new(RecordingModule::new("audit", &trace));
        runtime.register_module(module.clone()).unwrap();
        let kernel = kernel_with(&runtime);

        let err = kernel
            .execute(|cs| {
                let a = cs.create_node(["Person"]);
                let b = cs.create_node(["Person"]);
                cs.create_relationship(a, b, "_TXR_SHADOW").unwrap();
            })
            .unwrap_err();

        assert!(matches!(err, RuntimeError::IllegalTransaction { .. }));
        assert_eq!(module.dispatch_count(), 0);
        assert_eq!(kernel.relationship_count(), 0);

        let err = kernel
            .execute(|cs| {
                let id = cs.create_node(["Person"]);
                cs.add_label(id, "_TXR_Hidden").unwrap();
            })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::IllegalTransaction { .. }));
        assert_eq!(module.dispatch_count(), 0);
    }

    #[test]
    fn test_two_runtimes_drive_their_own_modules() {
        init_test_logging();
        let trace = new_trace();
        let tx_runtime = runtime("tx-driven");
        let timer_runtime = Arc::new(
            TxDrivenRuntime::new(
                RuntimeConfig::named("timer-driven").supporting(ModuleCapability::TimerDriven),
                Arc::new(InMemoryMetadataRepository::new()),
            )
            .unwrap(),
        );

        let module = Arc::new(RecordingModule::new("audit", &trace));
        assert!(tx_runtime.register_module(module.clone()).unwrap());
        assert!(!timer_runtime.register_module(module.clone()).unwrap());

        let kernel = GraphKernel::new();
        kernel.register_handler(tx_runtime.clone());
        kernel.register_handler(timer_runtime.clone());

        kernel.execute(|cs| cs.create_node(["Person"])).unwrap();

        assert_eq!(module.dispatch_count(), 1);
        assert!(timer_runtime.module_ids().is_empty());
    }

    #[test]
    fn test_commit_outcomes_are_counted() {
        let trace = new_trace();
        let runtime = runtime("counted");
        runtime
            .register_module(Arc::new(RecordingModule::new("audit", &trace)))
            .unwrap();
        let kernel = kernel_with(&runtime);
        let dispatched = COMMITS_TOTAL.with_label_values(&["counted", "dispatched"]);
        let illegal = COMMITS_TOTAL.with_label_values(&["counted", "illegal"]);
        let before = (dispatched.get(), illegal.get());

        kernel.execute(|cs| cs.create_node(["Person"])).unwrap();
        kernel
            .execute(|cs| {
                let id = cs.create_node(["Person"]);
                cs.set_node_property(id, "_TXR_seen", 1).unwrap();
            })
            .unwrap_err();

        assert_eq!(dispatched.get() - before.0, 1.0);
        assert_eq!(illegal.get() - before.1, 1.0);

        // Already registered by another test is fine.
        let _ = register_metrics();
        let exposition = encode_metrics().unwrap();
        assert!(exposition.contains("txr_commits_total"));
        assert!(exposition.contains("txr_module_dispatch_duration_seconds"));
    }
}
