// Send flow tests
// Drive the confirmation state machine against the in-memory engine and check
// which engine calls happen, in what order.

use std::sync::Arc;
use std::time::Duration;

use padawan_send::{
    engine::memory::{Op, PAYMENT_VBYTES},
    metrics::Metrics,
    notice::{Notice, Notices, BROADCAST_SUCCESS},
    validate::FeeRateBounds,
    BroadcastOutcome, EngineError, FlowError, MemoryEngine, PaymentRequest, Phase, SendFlow,
    ValidationError,
};

const ADDR: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

fn flow(balance: u64) -> (Arc<MemoryEngine>, Notices, SendFlow<MemoryEngine>) {
    let engine = Arc::new(MemoryEngine::new(balance));
    let notices = Notices::default();
    let flow = SendFlow::new(
        engine.clone(),
        notices.clone(),
        FeeRateBounds::default(),
        Metrics::new().unwrap(),
    );
    (engine, notices, flow)
}

#[tokio::test]
async fn test_out_of_range_fee_rate_never_reaches_engine() {
    println!("🧪 Testing fee rate bounds...");
    let (engine, notices, flow) = flow(1_000_000);
    let mut rx = notices.subscribe();

    for fee in ["0", "201", "500", "100000000000000000000"] {
        let err = flow.verify(&PaymentRequest::new(ADDR, "50000", fee)).await.unwrap_err();
        assert_eq!(
            err,
            FlowError::Validation(ValidationError::FeeRateOutOfRange { min: 1, max: 200 })
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Notice::error("Please input a fee rate between 1 and 200")
        );
    }
    assert_eq!(engine.calls().build, 0, "no build call may be issued for invalid input");
    assert_eq!(flow.phase(), Phase::Empty);
    println!("✅ fee rate bounds test passed");
}

#[tokio::test]
async fn test_missing_fields_checked_amount_then_address_then_fee() {
    let (engine, _notices, flow) = flow(1_000_000);
    let cases = [
        (PaymentRequest::new("", "", ""), ValidationError::MissingAmount),
        (PaymentRequest::new("", "1000", ""), ValidationError::MissingAddress),
        (PaymentRequest::new(ADDR, "1000", ""), ValidationError::MissingFeeRate),
    ];
    for (req, expected) in cases {
        assert_eq!(flow.verify(&req).await.unwrap_err(), FlowError::Validation(expected));
    }
    assert_eq!(engine.calls().build, 0);
}

#[tokio::test]
async fn test_successful_build_holds_exactly_one_plan() {
    let (engine, _notices, flow) = flow(1_000_000);
    let plan = flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap();

    assert_eq!(plan.sent_amount_sats, 50_000);
    assert_eq!(plan.fee_sats, Some(10 * PAYMENT_VBYTES));
    assert_eq!(flow.phase(), Phase::Built(plan.clone()));
    assert_eq!(flow.pending_plan(), Some(plan));
    assert_eq!(engine.calls().build, 1);

    // a second verify while one is pending is refused without touching the engine
    let err = flow.verify(&PaymentRequest::new(ADDR, "60000", "10")).await.unwrap_err();
    assert_eq!(err, FlowError::PlanPending);
    assert_eq!(engine.calls().build, 1);
}

#[tokio::test]
async fn test_cancel_discards_plan_without_sign_or_broadcast() {
    let (engine, _notices, flow) = flow(1_000_000);
    flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap();

    let plan = flow.cancel().unwrap();
    assert_eq!(plan.sent_amount_sats, 50_000);
    assert_eq!(flow.phase(), Phase::Empty);
    assert_eq!(flow.cancel().unwrap_err(), FlowError::NoPlan);
    assert_eq!(flow.confirm().await.unwrap_err(), FlowError::NoPlan);

    let calls = engine.calls();
    assert_eq!((calls.sign, calls.broadcast), (0, 0));
}

#[tokio::test]
async fn test_confirm_signs_before_broadcast() {
    let (engine, notices, flow) = flow(1_000_000);
    let mut rx = notices.subscribe();
    flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap();

    let outcome = flow.confirm().await.unwrap();
    assert_eq!(outcome, BroadcastOutcome::Success);
    assert_eq!(engine.call_log(), vec![Op::Build, Op::Sign, Op::Broadcast]);
    assert_eq!(rx.try_recv().unwrap().text, BROADCAST_SUCCESS);
    assert_eq!(engine.relayed().len(), 1);

    assert_eq!(flow.phase(), Phase::Terminal(BroadcastOutcome::Success));
    assert_eq!(flow.acknowledge(), Some(BroadcastOutcome::Success));
    assert_eq!(flow.phase(), Phase::Empty);
    assert_eq!(flow.acknowledge(), None);
}

#[tokio::test]
async fn test_sign_failure_skips_broadcast() {
    let (engine, notices, flow) = flow(1_000_000);
    let mut rx = notices.subscribe();
    engine.fail(Op::Sign, EngineError::Signing("key unavailable".into()));
    flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap();

    let outcome = flow.confirm().await.unwrap();
    assert_eq!(outcome, BroadcastOutcome::Failure("key unavailable".into()));
    assert_eq!(engine.calls().sign, 1);
    assert_eq!(engine.calls().broadcast, 0, "broadcast must never follow a failed sign");
    assert_eq!(rx.try_recv().unwrap(), Notice::error("Error: key unavailable"));

    // the failure stays visible until the caller acknowledges it
    assert_eq!(flow.phase(), Phase::Terminal(outcome));
}

#[tokio::test]
async fn test_broadcast_failure_is_reported() {
    let (engine, _notices, flow) = flow(1_000_000);
    engine.fail(Op::Broadcast, EngineError::Relay("no peers".into()));
    flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap();

    let outcome = flow.confirm().await.unwrap();
    assert_eq!(outcome, BroadcastOutcome::Failure("no peers".into()));
    assert_eq!(engine.call_log(), vec![Op::Build, Op::Sign, Op::Broadcast]);
    assert!(engine.relayed().is_empty());

    // a new send can start from a terminal failure
    engine.clear_failures();
    assert!(flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.is_ok());
}

#[tokio::test]
async fn test_build_failure_returns_to_empty_with_notice() {
    let (engine, notices, flow) = flow(10_000);
    let mut rx = notices.subscribe();

    let err = flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap_err();
    assert!(matches!(err, FlowError::Engine(EngineError::InsufficientFunds(_))));
    assert_eq!(flow.phase(), Phase::Empty);
    let notice = rx.try_recv().unwrap();
    assert!(notice.text.starts_with("Insufficient funds"));

    let err = flow.verify(&PaymentRequest::new("not an address", "5000", "1")).await.unwrap_err();
    assert!(matches!(err, FlowError::Engine(EngineError::InvalidAddress(_))));
    assert_eq!(engine.calls().build, 2);
    assert_eq!(engine.calls().sign, 0);
}

async fn wait_for_building(flow: &SendFlow<MemoryEngine>) {
    while !matches!(flow.phase(), Phase::Building { .. }) {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_abandon_discards_stale_build() {
    let (engine, _notices, flow) = flow(1_000_000);
    engine.set_build_delay(Duration::from_secs(5));

    let request = PaymentRequest::new(ADDR, "50000", "10");
    let (result, ()) = tokio::join!(flow.verify(&request), async {
        wait_for_building(&flow).await;
        flow.abandon();
    });

    assert_eq!(result.unwrap_err(), FlowError::Superseded);
    assert_eq!(flow.phase(), Phase::Empty);
    assert_eq!(engine.calls().build, 1, "the engine call itself is not cancelled");
    assert_eq!(engine.calls().sign, 0);
}

#[tokio::test(start_paused = true)]
async fn test_newer_verify_supersedes_in_flight_build() {
    let (engine, _notices, flow) = flow(1_000_000);
    engine.set_build_delay(Duration::from_secs(5));

    let first_request = PaymentRequest::new(ADDR, "50000", "10");
    let second_request = PaymentRequest::new(ADDR, "70000", "10");
    let (first, second) = tokio::join!(flow.verify(&first_request), async {
        wait_for_building(&flow).await;
        flow.verify(&second_request).await
    });

    assert_eq!(first.unwrap_err(), FlowError::Superseded);
    let plan = second.unwrap();
    assert_eq!(plan.sent_amount_sats, 70_000);
    assert_eq!(flow.pending_plan(), Some(plan));
    assert_eq!(engine.calls().build, 2);
}

#[tokio::test]
async fn test_abandon_clears_built_plan() {
    let (engine, _notices, flow) = flow(1_000_000);
    flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap();
    flow.abandon();
    assert_eq!(flow.phase(), Phase::Empty);
    assert_eq!(flow.confirm().await.unwrap_err(), FlowError::NoPlan);
    assert_eq!(engine.calls().sign, 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandon_during_broadcast_keeps_a_single_send() {
    let (engine, notices, flow) = flow(1_000_000);
    let mut rx = notices.subscribe();
    flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap();
    engine.set_sign_delay(Duration::from_secs(5));

    let second_request = PaymentRequest::new(ADDR, "60000", "10");
    let (first, (second_verify, second_confirm)) = tokio::join!(flow.confirm(), async {
        while flow.phase() != Phase::Broadcasting {
            tokio::task::yield_now().await;
        }
        flow.abandon();
        assert_eq!(flow.phase(), Phase::Empty);
        (flow.verify(&second_request).await, flow.confirm().await)
    });

    // the running broadcast still blocks a new plan after the screen is left
    assert_eq!(second_verify.unwrap_err(), FlowError::PlanPending);
    assert_eq!(second_confirm.unwrap_err(), FlowError::NoPlan);
    assert_eq!(engine.calls().build, 1);

    // the first send lands, its notice is posted late, the flow stays Empty
    assert_eq!(first.unwrap(), BroadcastOutcome::Success);
    assert_eq!(rx.try_recv().unwrap().text, BROADCAST_SUCCESS);
    assert_eq!(engine.relayed().len(), 1);
    assert_eq!(flow.phase(), Phase::Empty);
    assert_eq!(flow.acknowledge(), None);

    let plan = flow.verify(&second_request).await.unwrap();
    assert_eq!(plan.sent_amount_sats, 60_000);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_confirm_releases_the_flow() {
    let (engine, _notices, flow) = flow(1_000_000);
    flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.unwrap();
    engine.set_sign_delay(Duration::from_secs(5));

    let gave_up = tokio::time::timeout(Duration::from_secs(1), flow.confirm()).await;
    assert!(gave_up.is_err());
    assert_eq!(flow.phase(), Phase::Empty);
    assert_eq!(engine.calls().broadcast, 0);
    assert!(flow.verify(&PaymentRequest::new(ADDR, "50000", "10")).await.is_ok());
}
