//! Integration tests for the training operator loop.

mod test_utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cadence_hooks::builtin::{EarlyStopping, SetValueCommand, StopTrainingHook};
use cadence_hooks::prelude::*;
use cadence_operator::prelude::*;
use parking_lot::Mutex;
use test_utils::{config, idle_step, recording_step};

#[tokio::test]
async fn runs_every_iteration_of_every_epoch() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut operator = Operator::new(config(2, 3)).unwrap();

    let summary = operator.run(recording_step(&seen)).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(summary.ticks, 7);
    assert_eq!(summary.counters, TickCounters::at_epoch_end(2, 6));
    assert_eq!(
        *seen.lock(),
        vec![
            TickCounters::new(0, 1, false),
            TickCounters::new(0, 2, false),
            TickCounters::at_epoch_end(1, 3),
            TickCounters::new(1, 4, false),
            TickCounters::new(1, 5, false),
            TickCounters::at_epoch_end(2, 6),
        ]
    );
}

#[tokio::test]
async fn second_run_restarts_both_counters() {
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let mut operator = Operator::new(config(2, 2)).unwrap();

    operator.run(recording_step(&first)).await.unwrap();
    let summary = operator.run(recording_step(&second)).await.unwrap();

    assert_eq!(*second.lock(), *first.lock());
    assert_eq!(summary.counters, TickCounters::at_epoch_end(2, 4));
}

#[tokio::test]
async fn hooks_see_the_step_output_of_their_tick() {
    let losses = Arc::new(Mutex::new(Vec::new()));
    let hook_losses = Arc::clone(&losses);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut operator = Operator::new(config(1, 4)).unwrap();
    operator.add_hook(
        FnHook::builder("read_loss", move |ctx| {
            hook_losses.lock().push(*ctx.get::<f64>("metrics.loss")?);
            Ok(())
        })
        .every(2)
        .into_ref(),
    );

    operator.run(recording_step(&seen)).await.unwrap();

    assert_eq!(*losses.lock(), vec![0.5, 0.25]);
}

#[tokio::test]
async fn commands_fire_on_the_setup_tick() {
    let finished = Arc::new(AtomicUsize::new(0));
    let finished_count = Arc::clone(&finished);
    let mut operator = Operator::new(config(1, 2)).unwrap();
    operator.add_hook(Arc::new(
        SetValueCommand::new("schedule.phase", String::from("warmup")).with_on_finish(move || {
            finished_count.fetch_add(1, Ordering::SeqCst);
        }),
    ));

    let phases = Arc::new(Mutex::new(Vec::new()));
    let step_phases = Arc::clone(&phases);
    operator
        .run(move |registry: &mut cadence_registry::ParameterRegistry, _| {
            let phase = registry.get::<String>("schedule.phase")?.clone();
            step_phases.lock().push(phase);
            Ok::<_, cadence_registry::RegistryError>(())
        })
        .await
        .unwrap();

    assert_eq!(*phases.lock(), vec!["warmup".to_string(), "warmup".to_string()]);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_signal_ends_the_run_early() {
    let mut operator = Operator::new(config(10, 5)).unwrap();
    operator.add_hook(Arc::new(StopTrainingHook::after_iterations(7).with_reason("enough")));

    let summary = operator.run(idle_step).await.unwrap();

    assert_eq!(
        summary.stop_reason,
        StopReason::Signalled {
            hook: "stop_training".to_string(),
            reason: "enough".to_string(),
        }
    );
    assert_eq!(summary.counters.iteration, 7);
}

#[tokio::test]
async fn early_stopping_watches_epoch_metric() {
    let mut operator = Operator::new(config(20, 2).with_max_epochs(None)).unwrap();
    operator.add_hook(Arc::new(EarlyStopping::new("metrics.val_loss", 2)));

    // Improves for three epochs, then plateaus.
    let summary = operator
        .run(|registry: &mut cadence_registry::ParameterRegistry, counters: TickCounters| {
            let epoch = counters.epoch.min(3) as f64;
            registry.set("metrics.val_loss", 1.0 - epoch * 0.1).map(drop)
        })
        .await
        .unwrap();

    assert!(matches!(summary.stop_reason, StopReason::Signalled { .. }));
    assert_eq!(summary.counters.epoch, 5);
}

#[tokio::test]
async fn stop_handle_ends_the_run() {
    let mut operator = Operator::new(config(1, 100)).unwrap();
    let handle = operator.stop_handle();

    let summary = operator
        .run(move |_: &mut cadence_registry::ParameterRegistry, counters: TickCounters| {
            if counters.iteration == 3 {
                handle.stop();
            }
            Ok::<_, cadence_registry::RegistryError>(())
        })
        .await
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::Requested);
    assert_eq!(summary.counters.iteration, 3);
}

#[tokio::test]
async fn background_failures_do_not_stop_the_loop() {
    let failures = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&failures);

    let mut operator = Operator::new(config(1, 4)).unwrap();
    operator.on_event(move |event| {
        if matches!(event, SchedulerEvent::BackgroundFailed { .. }) {
            observed.fetch_add(1, Ordering::SeqCst);
        }
    });
    operator.add_hook(
        FnHook::builder("flaky_export", |_| Err(HookError::failed("disk full")))
            .background()
            .into_ref(),
    );

    let summary = operator.run(idle_step).await.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(summary.background_failures, 4);
    assert_eq!(failures.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn inline_failure_ends_the_run() {
    let mut operator = Operator::new(config(1, 4)).unwrap();
    operator.add_hook(
        FnHook::builder("needs_missing", |ctx| ctx.get::<f64>("not.there").map(drop))
            .every(3)
            .into_ref(),
    );

    let err = operator.run(idle_step).await.unwrap_err();

    assert!(matches!(
        err,
        OperatorError::Schedule(ScheduleError::Invocation { ref hook, .. }) if hook == "needs_missing"
    ));
    assert_eq!(operator.counters().iteration, 3);
}

#[tokio::test]
async fn invalid_hook_graph_fails_before_training() {
    let steps = Arc::new(AtomicUsize::new(0));
    let step_count = Arc::clone(&steps);
    let coarse = FnHook::builder("coarse", |_| Ok(())).every(4).into_ref();
    let mut operator = Operator::new(config(1, 4)).unwrap();
    operator.add_hook(FnHook::builder("fine", |_| Ok(())).requires(coarse).into_ref());

    let err = operator
        .run(move |_: &mut cadence_registry::ParameterRegistry, _: TickCounters| {
            step_count.fetch_add(1, Ordering::SeqCst);
            Ok::<_, cadence_registry::RegistryError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OperatorError::Schedule(ScheduleError::Resolution(
            ResolutionError::InvalidDependencyTiming { .. }
        ))
    ));
    assert_eq!(steps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn step_failure_is_reported_with_counters() {
    let mut operator = Operator::new(config(1, 4)).unwrap();

    let err = operator
        .run(|registry: &mut cadence_registry::ParameterRegistry, _: TickCounters| {
            registry.get::<f64>("batch.size").map(drop)
        })
        .await
        .unwrap_err();

    match err {
        OperatorError::TrainingStep { counters, .. } => {
            assert_eq!(counters, TickCounters::new(0, 1, false));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn custom_signals_are_collected() {
    let mut operator = Operator::new(config(1, 3)).unwrap();
    operator.add_hook(
        FnHook::builder("announcer", |ctx| {
            ctx.signal(HookSignal::Custom(format!("tick {}", ctx.counters().iteration)));
            Ok(())
        })
        .background()
        .into_ref(),
    );

    let summary = operator.run(idle_step).await.unwrap();

    let mut messages: Vec<_> = summary
        .custom_signals
        .iter()
        .map(|envelope| match &envelope.signal {
            HookSignal::Custom(message) => message.clone(),
            HookSignal::StopTraining { .. } => unreachable!(),
        })
        .collect();
    messages.sort();
    assert_eq!(messages, vec!["tick 1", "tick 2", "tick 3"]);
}
