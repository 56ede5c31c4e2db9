use backpressure_pipeline::{
    Discipline, ErrorKind, Event, EvictionPolicy, FlowController, OverflowMode, PipelineState,
    Signal,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Submit,
    Take,
    Request(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Submit),
        2 => Just(Op::Take),
        1 => (1u64..4).prop_map(Op::Request),
    ]
}

fn fifo_mode() -> impl Strategy<Value = OverflowMode> {
    prop_oneof![
        Just(OverflowMode::DropNew),
        Just(OverflowMode::KeepLatest),
        (0usize..6).prop_map(|capacity| OverflowMode::Buffered {
            capacity,
            eviction: EvictionPolicy::DropOldest
        }),
        (0usize..6).prop_map(|capacity| OverflowMode::Buffered {
            capacity,
            eviction: EvictionPolicy::DropLatest
        }),
    ]
}

fn discipline() -> impl Strategy<Value = Discipline> {
    prop_oneof![Just(Discipline::Push), Just(Discipline::DemandDriven)]
}

#[derive(Default)]
struct Observed {
    submitted: u64,
    delivered: Vec<u64>,
    discarded: Vec<u64>,
    granted: u64,
}

fn run(controller: &FlowController<u64>, ops: &[Op]) -> Observed {
    let mut observed = Observed::default();
    for op in ops {
        match op {
            Op::Submit => {
                controller.submit(observed.submitted);
                observed.submitted += 1;
                assert!(controller.buffered_len() <= controller.mode().capacity());
            }
            Op::Take => match controller.try_take() {
                Some(Event::Signal(Signal::Value(v))) => observed.delivered.push(v),
                Some(Event::Discarded(v)) => observed.discarded.push(v),
                _ => {}
            },
            Op::Request(n) => {
                controller.request_credit(*n);
                observed.granted += n;
            }
        }
    }
    observed
}

proptest! {
    #[test]
    fn delivery_preserves_acceptance_order(
        mode in fifo_mode(),
        discipline in discipline(),
        ops in prop::collection::vec(op(), 0..200),
    ) {
        let controller = FlowController::new(mode, discipline);
        let observed = run(&controller, &ops);

        prop_assert!(observed.delivered.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(controller.state(), PipelineState::Active);

        // Every submitted value is delivered, discarded, or still pending
        let mut rest = observed;
        while let Some(event) = controller.try_take() {
            match event {
                Event::Discarded(v) => rest.discarded.push(v),
                Event::Signal(Signal::Value(v)) => rest.delivered.push(v),
                Event::Signal(_) => {}
            }
        }
        let accounted = rest.delivered.len() + rest.discarded.len() + controller.pending();
        prop_assert_eq!(accounted as u64, rest.submitted);
    }

    #[test]
    fn demand_driven_credit_is_conserved(
        mode in fifo_mode(),
        ops in prop::collection::vec(op(), 0..200),
    ) {
        let controller = FlowController::new(mode, Discipline::DemandDriven);
        let observed = run(&controller, &ops);

        prop_assert!(observed.delivered.len() as u64 <= observed.granted);
        prop_assert_eq!(
            controller.credit(),
            observed.granted - observed.delivered.len() as u64
        );
    }

    #[test]
    fn unbounded_fail_errors_on_second_pending_value(
        discipline in discipline(),
        ops in prop::collection::vec(op(), 0..100),
    ) {
        let controller = FlowController::new(OverflowMode::UnboundedFail, discipline);
        let mut pending = 0usize;
        let mut errored = false;

        for op in &ops {
            match op {
                Op::Submit => {
                    let state = controller.submit(0);
                    if !errored {
                        pending += 1;
                        errored = pending > 1;
                    }
                    prop_assert_eq!(state == PipelineState::Errored, errored);
                }
                Op::Take => {
                    if let Some(Event::Signal(Signal::Value(_))) = controller.try_take() {
                        pending -= 1;
                    }
                }
                Op::Request(n) => {
                    controller.request_credit(*n);
                }
            }
        }

        if errored {
            prop_assert_eq!(controller.failure(), Some(ErrorKind::Overloaded));
            prop_assert_eq!(controller.pending(), 0);
        }
    }

    #[test]
    fn terminal_transition_happens_once(
        mode in fifo_mode(),
        calls in prop::collection::vec(0u8..3, 1..10),
    ) {
        let controller = FlowController::<u64>::new(mode, Discipline::Push);
        controller.submit(1);

        let first = calls[0];
        for call in &calls {
            match call {
                0 => controller.cancel(),
                1 => controller.complete(),
                _ => controller.fail(ErrorKind::Timeout),
            }
        }

        let expected = match first {
            0 => PipelineState::Cancelled,
            1 => PipelineState::Completed,
            _ => PipelineState::Errored,
        };
        prop_assert_eq!(controller.state(), expected);

        let terminals = std::iter::from_fn(|| controller.try_take())
            .filter(|event| matches!(event, Event::Signal(s) if s.is_terminal()))
            .count();
        let expected_terminals = if expected == PipelineState::Cancelled { 0 } else { 1 };
        prop_assert_eq!(terminals, expected_terminals);
    }
}
