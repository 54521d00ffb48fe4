//! End-to-end tests for host pipelines.

#[cfg(test)]
mod tests {
    use crate::config::InvokeOptions;
    use crate::context::{Attributes, Scope};
    use crate::errors::{ConfigurationError, StepError, SteplineError, StructuredError};
    use crate::events::MockEventSink;
    use crate::pipeline::{
        CallbackScope, ExecutionEngine, Predicate, RescueFilter, StepFn, StepOptions, StepRegistrar,
        StepTarget, Steps,
    };
    use crate::testing::{
        assert_step_kind, assert_structured, assert_unresolved_target, attributes, CallLog, TestRun,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::thread;

    fn user_role<'s, H>(scope: &'s Scope<'_, H>) -> Option<&'s Value> {
        scope.binding("user").and_then(|user| user.get("role"))
    }

    fn user_details() -> Attributes {
        attributes(json!({
            "first_name": "foo",
            "last_name": "bar",
            "email": "foo@bar.com",
        }))
    }

    // Registration flow: bind the email, create a user, default its role,
    // run admin-only steps, then report.
    #[derive(Default)]
    struct Register {
        admin: bool,
    }

    impl Steps for Register {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_binding(["email"])?
                .declare_step("create_user", StepOptions::new().set("user"))?
                .declare_step(
                    "set_user_role",
                    StepOptions::new().when(Predicate::new(|scope| {
                        user_role(scope).map_or(true, Value::is_null)
                    })),
                )?
                .declare_conditional_group(
                    Predicate::new(|scope| user_role(scope) == Some(&json!("admin"))),
                    |group| {
                        group.declare_step("do_admin_things", StepOptions::new())?;
                        Ok(())
                    },
                )?
                .declare_step("send_welcome_email", StepOptions::new())?;

            steps
                .declare_method(
                    "step_create_user",
                    StepFn::with_attributes(|scope, attrs| {
                        Ok(json!({
                            "first_name": attrs.get("first_name"),
                            "last_name": attrs.get("last_name"),
                            "email": scope.binding("email"),
                            "role": attrs.get("role"),
                        }))
                    }),
                )?
                .declare_method(
                    "step_set_user_role",
                    StepFn::new(|scope| {
                        if let Some(user) = scope.binding_mut("user") {
                            user["role"] = json!("basic");
                        }
                        Ok(json!("basic"))
                    }),
                )?
                .declare_method(
                    "step_do_admin_things",
                    StepFn::new(|scope: &mut Scope<'_, Self>| {
                        scope.host_mut().admin = true;
                        Ok(json!(true))
                    }),
                )?
                .declare_method(
                    "step_send_welcome_email",
                    StepFn::new(|scope: &mut Scope<'_, Self>| {
                        Ok(json!({
                            "user": scope.binding("user"),
                            "email_sent": true,
                            "admin": scope.host().admin,
                        }))
                    }),
                )?;
            Ok(())
        }
    }

    #[test]
    fn test_registering_as_basic_user() {
        let response = Register::default().invoke(user_details()).unwrap();

        assert_eq!(response["user"]["role"], json!("basic"));
        assert_eq!(response["user"]["email"], json!("foo@bar.com"));
        assert_eq!(response["email_sent"], json!(true));
        assert_eq!(response["admin"], json!(false));
    }

    #[test]
    fn test_registering_as_admin() {
        let attrs = user_details().with("role", json!("admin"));
        let mut host = Register::default();
        let response = host.invoke(attrs).unwrap();

        assert_eq!(response["user"]["role"], json!("admin"));
        assert_eq!(response["admin"], json!(true));
        assert!(host.admin);
    }

    #[test]
    fn test_binding_override_beats_attribute() {
        let options = InvokeOptions::new().with_override("email", json!("override@bar.com"));
        let response = Register::default().invoke_with(user_details(), &options).unwrap();

        assert_eq!(response["user"]["email"], json!("override@bar.com"));
    }

    #[test]
    fn test_invocations_are_idempotent() {
        let first = Register::default().invoke(user_details()).unwrap();
        let second = Register::default().invoke(user_details()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_invocations_share_one_definition() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| Register::default().invoke(user_details()).unwrap()))
            .collect();

        let responses: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(responses.windows(2).all(|pair| pair[0] == pair[1]));
        assert!(Arc::ptr_eq(
            &Register::definition().unwrap(),
            &Register::definition().unwrap()
        ));
    }

    #[test]
    fn test_events_reported_to_mock_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);

        let mut sink = MockEventSink::new();
        sink.expect_emit().returning(move |event_type, data| {
            assert!(data.is_some_and(|data| data.get("run_id").is_some()));
            record.lock().push(event_type.to_string());
        });

        let definition = Register::definition().unwrap();
        ExecutionEngine::new(&definition)
            .with_event_sink(Arc::new(sink))
            .run(&mut Register::default(), &user_details(), &InvokeOptions::new())
            .unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                "pipeline.started",
                "step.started",
                "step.completed",
                "step.started",
                "step.completed",
                "group.skipped",
                "step.started",
                "step.completed",
                "pipeline.completed",
            ]
        );
    }

    // A user without a role picks up the default inside a condition group.
    #[derive(Default)]
    struct DefaultRole {
        final_user: Option<Value>,
    }

    impl Steps for DefaultRole {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_step(
                    StepTarget::inline(StepFn::with_attributes(|_, attrs| {
                        Ok(json!({"name": attrs.get("name"), "role": null}))
                    }))
                    .labeled("set_user"),
                    StepOptions::new().set("user"),
                )?
                .declare_conditional_group(
                    Predicate::new(|scope| user_role(scope).is_some_and(Value::is_null)),
                    |group| {
                        group.declare_step("set_default_role", StepOptions::new())?;
                        Ok(())
                    },
                )?
                .after(CallbackScope::All, |scope, _| {
                    let user = scope.binding("user").cloned();
                    scope.host_mut().final_user = user;
                    Ok(())
                })?
                .declare_method(
                    "step_set_default_role",
                    StepFn::new(|scope| {
                        let user = scope
                            .binding_mut("user")
                            .ok_or_else(|| StepError::new("missing_user", "user is not bound"))?;
                        user["role"] = json!("basic");
                        Ok(user.clone())
                    }),
                )?;
            Ok(())
        }
    }

    #[test]
    fn test_condition_group_sets_default_role() {
        let mut host = DefaultRole::default();
        let result = host.invoke(attributes(json!({"name": "a"}))).unwrap();

        assert_eq!(result, json!({"name": "a", "role": "basic"}));
        assert_eq!(host.final_user, Some(json!({"name": "a", "role": "basic"})));
    }

    // Division by zero inside an inline step, recovered by a catch-all rescue.
    struct Divide;

    impl Steps for Divide {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_step(
                    StepFn::new(|_| {
                        let divisor = 0_i64;
                        1_i64.checked_div(divisor).map(Value::from).ok_or_else(|| {
                            SteplineError::from(StepError::new("zero_division", "divided by 0"))
                        })
                    }),
                    StepOptions::new(),
                )?
                .declare_rescue(RescueFilter::any(), StepFn::new(|_| Ok(json!("recovered"))))?;
            Ok(())
        }
    }

    #[test]
    fn test_division_by_zero_is_rescued() {
        assert_eq!(Divide.invoke(Attributes::new()).unwrap(), json!("recovered"));
    }

    // Two writers of the same binding; the second never runs.
    #[derive(Default)]
    struct SecondWriter {
        bound: Option<Value>,
    }

    impl Steps for SecondWriter {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_step(StepFn::new(|_| Ok(json!("first"))), StepOptions::new().set("result"))?
                .declare_step(
                    StepFn::new(|_| Ok(json!("second"))),
                    StepOptions::new()
                        .set("result")
                        .when(Predicate::new(|_| false)),
                )?
                .after(CallbackScope::All, |scope, _| {
                    let bound = scope.binding("result").cloned();
                    scope.host_mut().bound = bound;
                    Ok(())
                })?;
            Ok(())
        }
    }

    #[test]
    fn test_false_second_writer_changes_nothing() {
        let mut host = SecondWriter::default();
        let result = host.invoke(Attributes::new()).unwrap();

        assert_eq!(result, json!("first"));
        assert_eq!(host.bound, Some(json!("first")));
    }

    // Steps partitioned by prefix.
    #[derive(Default)]
    struct Partitioned {
        log: CallLog,
    }

    fn logged(name: &'static str) -> StepFn<Partitioned> {
        StepFn::new(move |scope: &mut Scope<'_, Partitioned>| {
            scope.host().log.record(name);
            Ok(json!(name))
        })
    }

    impl Steps for Partitioned {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_step("a", StepOptions::new())?
                .declare_step("a", StepOptions::new().prefix("filter"))?
                .declare_step("b", StepOptions::new().prefix("filter"))?
                .declare_step("c", StepOptions::new().prefix("filter_extra"))?
                .declare_method("step_a", logged("step_a"))?
                .declare_method("filter_a", logged("filter_a"))?
                .declare_method("filter_b", logged("filter_b"))?
                .declare_method("filter_extra_c", logged("filter_extra_c"))?;
            Ok(())
        }
    }

    #[test]
    fn test_prefix_filtering_is_exact() {
        let mut host = Partitioned::default();
        assert_eq!(host.invoke(Attributes::new()).unwrap(), json!("step_a"));
        assert_eq!(host.log.entries(), vec!["step_a"]);

        host.log.clear();
        let options = InvokeOptions::new().with_prefix("filter");
        assert_eq!(host.invoke_with(Attributes::new(), &options).unwrap(), json!("filter_b"));
        assert_eq!(host.log.entries(), vec!["filter_a", "filter_b"]);

        host.log.clear();
        let options = InvokeOptions::new().with_prefix("other");
        assert_eq!(host.invoke_with(Attributes::new(), &options).unwrap(), Value::Null);
        assert!(host.log.is_empty());
    }

    #[test]
    fn test_prefix_run_reports_completed_steps() {
        let definition = Partitioned::definition().unwrap();
        let run = TestRun::execute(
            &definition,
            &mut Partitioned::default(),
            &Attributes::new(),
            &InvokeOptions::new().with_prefix("filter_extra"),
        );

        assert_eq!(run.completed_steps(), vec!["c"]);
        assert_eq!(run.events.events_of_type("step.skipped").len(), 3);
        assert_eq!(run.outcome.unwrap(), json!("filter_extra_c"));
    }

    // Callbacks around the run, every step and one named step.
    #[derive(Default)]
    struct Audited {
        log: CallLog,
    }

    impl Steps for Audited {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_step("first", StepOptions::new())?
                .declare_step("skipped", StepOptions::new().when(Predicate::new(|_| false)))?
                .declare_step("second", StepOptions::new().set("out"))?
                .before(CallbackScope::All, |scope, _| {
                    scope.host().log.record("before:all");
                    Ok(())
                })?
                .after(CallbackScope::All, |scope, event| {
                    let value = event.value.cloned().unwrap_or_default();
                    scope.host().log.record(format!("after:all={value}"));
                    Ok(())
                })?
                .before(CallbackScope::Each, |scope, event| {
                    let step = event.step.unwrap_or("?");
                    scope.host().log.record(format!("before:each:{step}"));
                    Ok(())
                })?
                .after(CallbackScope::Each, |scope, event| {
                    let step = event.step.unwrap_or("?");
                    scope.host().log.record(format!("after:each:{step}"));
                    Ok(())
                })?
                .before(CallbackScope::Step("second".to_string()), |scope, event| {
                    assert!(event.value.is_none());
                    scope.host().log.record("before:second");
                    Ok(())
                })?
                .after(CallbackScope::Step("second".to_string()), |scope, event| {
                    let value = event.value.cloned().unwrap_or_default();
                    assert!(scope.binding("out").is_none());
                    scope.host().log.record(format!("after:second={value}"));
                    Ok(())
                })?
                .declare_method(
                    "step_first",
                    StepFn::new(|scope: &mut Scope<'_, Self>| {
                        scope.host().log.record("step:first");
                        Ok(json!(1))
                    }),
                )?
                .declare_method(
                    "step_second",
                    StepFn::new(|scope: &mut Scope<'_, Self>| {
                        scope.host().log.record("step:second");
                        Ok(json!(2))
                    }),
                )?;
            Ok(())
        }
    }

    #[test]
    fn test_callbacks_bracket_their_scope() {
        let mut host = Audited::default();
        assert_eq!(host.invoke(Attributes::new()).unwrap(), json!(2));

        assert_eq!(
            host.log.entries(),
            vec![
                "before:all",
                "before:each:first",
                "step:first",
                "after:each:first",
                "before:each:second",
                "before:second",
                "step:second",
                "after:each:second",
                "after:second=2",
                "after:all=2",
            ]
        );
    }

    #[test]
    fn test_callbacks_fire_once_per_invocation() {
        let mut host = Audited::default();
        host.invoke(Attributes::new()).unwrap();
        host.invoke(Attributes::new()).unwrap();

        assert_eq!(host.log.count("before:all"), 2);
        assert_eq!(host.log.count("after:all=2"), 2);
        assert_eq!(host.log.count("before:second"), 2);
        assert!(!host.log.contains("before:each:skipped"));
    }

    // Failures that must never be rescued, and rescue selection.
    struct Guarded;

    impl Steps for Guarded {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_step(
                    StepFn::with_attributes(|_, attrs| {
                        let kind = attrs.get("kind").and_then(Value::as_str).unwrap_or("none");
                        if kind == "structured" {
                            return Err(StructuredError::new(json!({"code": 402})).into());
                        }
                        Err(StepError::new(kind, "failed").into())
                    }),
                    StepOptions::new(),
                )?
                .declare_rescue(RescueFilter::kinds(["io"]), StepFn::new(|_| Ok(json!("io"))))?
                .declare_rescue(
                    RescueFilter::kinds(["handler"]),
                    StepFn::new(|_| Err(StepError::new("rescue_failed", "handler broke").into())),
                )?
                .declare_rescue(
                    RescueFilter::any(),
                    StepFn::new(|scope| {
                        let kind = scope.rescued_error().map(StepError::kind).unwrap_or_default();
                        Ok(json!(format!("any:{kind}")))
                    }),
                )?;
            Ok(())
        }
    }

    #[test]
    fn test_structured_error_bypasses_rescues() {
        let result = Guarded.invoke(attributes(json!({"kind": "structured"})));
        assert_structured(&result, &json!({"code": 402}));
        assert_eq!(result.unwrap_err().to_string(), r#"{"code":402}"#);
    }

    #[test]
    fn test_first_matching_rescue_wins() {
        let io = Guarded.invoke(attributes(json!({"kind": "io"}))).unwrap();
        assert_eq!(io, json!("io"));

        let other = Guarded.invoke(attributes(json!({"kind": "timeout"}))).unwrap();
        assert_eq!(other, json!("any:timeout"));
    }

    #[test]
    fn test_failing_rescue_handler_propagates() {
        let result = Guarded.invoke(attributes(json!({"kind": "handler"})));
        assert_step_kind(&result, "rescue_failed");
    }

    struct Unguarded;

    impl Steps for Unguarded {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_step("missing", StepOptions::new())?
                .declare_rescue(RescueFilter::kinds(["io"]), StepFn::new(|_| Ok(json!("io"))))?;
            Ok(())
        }
    }

    #[test]
    fn test_unmatched_error_propagates() {
        let result = Unguarded.invoke(Attributes::new());
        assert_unresolved_target(&result, "step_missing");
    }

    // Rescues scoped to one group; structured errors still escape.
    #[derive(Default)]
    struct Layered {
        log: CallLog,
    }

    impl Steps for Layered {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_conditional_group(Predicate::new(|_| true), |group| {
                    group
                        .declare_step(
                            StepFn::with_attributes(|_, attrs| {
                                if attrs.get("structured").is_some() {
                                    return Err(StructuredError::empty().into());
                                }
                                Err(StepError::new("io", "flaky").into())
                            }),
                            StepOptions::new(),
                        )?
                        .declare_rescue(RescueFilter::any(), StepFn::new(|_| Ok(json!("group"))))?;
                    Ok(())
                })?
                .declare_step(
                    StepFn::new(|scope: &mut Scope<'_, Layered>| {
                        scope.host().log.record("after_group");
                        Ok(json!("done"))
                    }),
                    StepOptions::new().set("tail"),
                )?
                .declare_rescue(RescueFilter::any(), StepFn::new(|_| Ok(json!("top"))))?;
            Ok(())
        }
    }

    #[test]
    fn test_group_rescue_recovers_and_parent_continues() {
        let mut host = Layered::default();
        assert_eq!(host.invoke(Attributes::new()).unwrap(), json!("done"));
        assert_eq!(host.log.entries(), vec!["after_group"]);
    }

    #[test]
    fn test_structured_error_escapes_every_rescue() {
        let mut host = Layered::default();
        let result = host.invoke(attributes(json!({"structured": true})));

        assert!(matches!(result, Err(SteplineError::Structured(ref err)) if err.payload().is_none()));
        assert!(host.log.is_empty());
    }

    // Branching helpers: if/else pairs and negated groups.
    #[derive(Default)]
    struct Access {
        log: CallLog,
    }

    fn is_admin() -> Predicate<Access> {
        Predicate::with_attributes(|_, attrs| attrs.get("role") == Some(&json!("admin")))
    }

    impl Steps for Access {
        fn define(steps: &mut StepRegistrar<Self>) -> Result<(), ConfigurationError> {
            steps
                .declare_if_else(is_admin(), ("grant", "deny"), StepOptions::new().set("access"))?
                .declare_unless_group(is_admin(), |group| {
                    group.declare_step(
                        StepTarget::inline(StepFn::new(|scope: &mut Scope<'_, Access>| {
                            Ok(json!({"audited": scope.binding("access")}))
                        }))
                        .labeled("audit"),
                        StepOptions::new(),
                    )?;
                    Ok(())
                })?
                .after(CallbackScope::Step("audit".to_string()), |scope, _| {
                    scope.host().log.record("audit");
                    Ok(())
                })?
                .declare_method("step_grant", StepFn::new(|_| Ok(json!("granted"))))?
                .declare_method("step_deny", StepFn::new(|_| Ok(json!("denied"))))?;
            Ok(())
        }
    }

    #[test]
    fn test_if_else_picks_one_branch() {
        let mut admin = Access::default();
        let result = admin.invoke(attributes(json!({"role": "admin"}))).unwrap();
        assert_eq!(result, json!("granted"));
        assert!(admin.log.is_empty());

        let mut guest = Access::default();
        let result = guest.invoke(attributes(json!({"role": "guest"}))).unwrap();
        assert_eq!(result, json!({"audited": "denied"}));
        assert_eq!(guest.log.entries(), vec!["audit"]);
    }
}
