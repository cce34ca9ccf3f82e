//! Integration tests for the three-stage rate limiter.

use std::collections::HashMap;
use std::time::Duration;
use toolgate_limit::{LimitConfig, LimitStage, RateDecision, RateLimitSettings, RateLimiter};

fn settings(default: LimitConfig, max_concurrent: u32) -> RateLimitSettings {
    RateLimitSettings {
        default,
        tool_overrides: HashMap::new(),
        max_concurrent,
    }
}

#[test]
fn token_bucket_burst_then_denial_with_retry_hint() {
    // capacity=5, refill=1/s: five rapid calls admitted, sixth denied with
    // retry_after just under one second.
    let limiter =
        RateLimiter::new(settings(LimitConfig::new(5, 1.0, 1000, 3600), 100)).unwrap();

    for _ in 0..5 {
        let decision = limiter.check_and_consume("fresh", "processes");
        assert!(decision.allowed());
    }

    let decision = limiter.check_and_consume("fresh", "processes");
    match decision {
        RateDecision::Denied { stage, retry_after } => {
            assert_eq!(stage, LimitStage::TokenBucket);
            assert!(retry_after.as_secs_f64() > 0.8 && retry_after.as_secs_f64() <= 1.0);
        }
        RateDecision::Admitted(_) => panic!("sixth call within the burst must be denied"),
    }
}

#[test]
fn sliding_window_bounds_sustained_rate_and_resets() {
    // Generous bucket so only the window binds: limit 3 per 1s window.
    let limiter =
        RateLimiter::new(settings(LimitConfig::new(100, 100.0, 3, 1), 100)).unwrap();

    for _ in 0..3 {
        assert!(limiter.check_and_consume("u1", "processes").allowed());
    }

    let denied = limiter.check_and_consume("u1", "processes");
    match denied {
        RateDecision::Denied { stage, retry_after } => {
            assert_eq!(stage, LimitStage::SlidingWindow);
            assert!(retry_after <= Duration::from_secs(1));
        }
        RateDecision::Admitted(_) => panic!("fourth call in the window must be denied"),
    }

    // After the window passes, the budget is restored.
    std::thread::sleep(Duration::from_millis(1100));
    assert!(limiter.check_and_consume("u1", "processes").allowed());
}

#[test]
fn concurrency_cap_denies_third_in_flight_until_release() {
    let limiter =
        RateLimiter::new(settings(LimitConfig::new(100, 100.0, 1000, 3600), 2)).unwrap();

    let first = limiter.check_and_consume("u1", "processes");
    let second = limiter.check_and_consume("u2", "processes");
    assert!(first.allowed());
    assert!(second.allowed());

    let third = limiter.check_and_consume("u3", "processes");
    assert!(matches!(
        third,
        RateDecision::Denied {
            stage: LimitStage::Concurrency,
            ..
        }
    ));

    // Releasing one guard frees a slot.
    drop(first);
    assert!(limiter.check_and_consume("u3", "processes").allowed());
}

#[test]
fn guard_releases_on_every_exit_path() {
    let limiter =
        RateLimiter::new(settings(LimitConfig::new(100, 100.0, 1000, 3600), 1)).unwrap();

    // Simulated tool error: the guard drops when the scope unwinds normally
    // or early, either way the slot frees.
    {
        let decision = limiter.check_and_consume("u1", "processes");
        assert!(decision.allowed());
        // decision (and its guard) dropped here
    }
    assert!(limiter.check_and_consume("u1", "processes").allowed());
}

#[test]
fn tool_override_is_independent_of_default_budget() {
    let mut config = settings(LimitConfig::new(100, 100.0, 1000, 3600), 100);
    config
        .tool_overrides
        .insert("custom_query".to_string(), LimitConfig::new(2, 0.01, 2, 60));
    let limiter = RateLimiter::new(config).unwrap();

    // Drain the strict custom_query budget.
    assert!(limiter.check_and_consume("u1", "custom_query").allowed());
    assert!(limiter.check_and_consume("u1", "custom_query").allowed());
    assert!(!limiter.check_and_consume("u1", "custom_query").allowed());

    // The default budget for other tools is untouched.
    assert!(limiter.check_and_consume("u1", "processes").allowed());
}

#[test]
fn reconfiguration_applies_without_restart() {
    let limiter =
        RateLimiter::new(settings(LimitConfig::new(1, 0.01, 1000, 3600), 100)).unwrap();

    assert!(limiter.check_and_consume("u1", "processes").allowed());
    assert!(!limiter.check_and_consume("u1", "processes").allowed());

    // Raising the refill rate makes tokens available immediately on the next
    // refill pass.
    limiter
        .configure_limits(None, LimitConfig::new(10, 1000.0, 1000, 3600))
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(limiter.check_and_consume("u1", "processes").allowed());
}

#[test]
fn lowering_concurrency_cap_takes_effect_for_new_requests() {
    let limiter =
        RateLimiter::new(settings(LimitConfig::new(100, 100.0, 1000, 3600), 10)).unwrap();

    let held = limiter.check_and_consume("u1", "processes");
    assert!(held.allowed());

    limiter.configure_max_concurrent(1).unwrap();
    assert!(!limiter.check_and_consume("u2", "processes").allowed());

    drop(held);
    assert!(limiter.check_and_consume("u2", "processes").allowed());
}

#[test]
fn status_reports_remaining_budget() {
    let limiter =
        RateLimiter::new(settings(LimitConfig::new(5, 0.01, 100, 3600), 10)).unwrap();

    let admitted = limiter.check_and_consume("u1", "processes");
    assert!(admitted.allowed());

    let status = limiter.status("u1").unwrap();
    assert_eq!(status.tokens_available, 4);
    assert_eq!(status.window_remaining, 99);
    assert_eq!(status.in_flight, 1);
    assert_eq!(status.max_concurrent, 10);
}

#[test]
fn concurrent_identities_never_interfere() {
    let limiter = std::sync::Arc::new(
        RateLimiter::new(settings(LimitConfig::new(50, 100.0, 1000, 3600), 1000)).unwrap(),
    );

    let mut handles = Vec::new();
    for t in 0..8 {
        let limiter = limiter.clone();
        handles.push(std::thread::spawn(move || {
            let identity = format!("worker{t}");
            let mut admitted = 0;
            for _ in 0..50 {
                if limiter.check_and_consume(&identity, "processes").allowed() {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    // Each identity has its own bucket; refill tops up 50-token buckets fast
    // enough that every worker admits at least its burst.
    for handle in handles {
        assert!(handle.join().unwrap() >= 50);
    }
}
