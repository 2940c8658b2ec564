mod common;

use common::*;
use lineage_kernel::Action;
use lineage_node::collaborators::{GenerateOptions, PoisonSpec};
use lineage_node::errors::EngineError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_generate_waits_for_poison() {
    let tuner = FakeFineTuner::slow(Duration::from_millis(300));
    let started = tuner.started.clone();
    let h = harness_with(HarnessOptions {
        finetuner: tuner,
        ..Default::default()
    });

    let gw = h.gateway.clone();
    let poison = tokio::spawn(async move { gw.poison(&PoisonSpec::default(), Some("bad")).await });
    started.notified().await;

    let gw = h.gateway.clone();
    let generate = tokio::spawn(async move {
        gw.generate("def f():", &GenerateOptions::default(), CancellationToken::new()).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!generate.is_finished());
    assert!(h.coordinator.blocks().await.is_empty());

    poison.await.unwrap().unwrap();
    let generated = generate.await.unwrap().unwrap();

    // The generation ran on the poisoned model and was recorded after it.
    assert!(generated.output.ends_with("[model:pristine+TPIx40]"));
    let blocks = h.coordinator.blocks().await;
    assert_eq!(blocks.iter().map(|b| b.action).collect::<Vec<_>>(), vec![Action::Poison, Action::Generate]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exclusive_ops_time_out_under_contention() {
    let tuner = FakeFineTuner::slow(Duration::from_millis(500));
    let started = tuner.started.clone();
    let h = harness_with(HarnessOptions {
        finetuner: tuner,
        lock_timeout: Duration::from_millis(50),
        ..Default::default()
    });

    let gw = h.gateway.clone();
    let poison = tokio::spawn(async move { gw.poison(&PoisonSpec::default(), None).await });
    started.notified().await;

    assert!(matches!(h.gateway.mark_clean().await, Err(EngineError::LockContention)));
    assert!(matches!(h.gateway.revert().await, Err(EngineError::LockContention)));

    poison.await.unwrap().unwrap();
    assert_eq!(h.coordinator.blocks().await.len(), 1);
    h.gateway.mark_clean().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generates_keep_chain_valid() {
    let h = harness_with(HarnessOptions {
        generate_delay: Duration::from_millis(5),
        ..Default::default()
    });

    let mut handles = Vec::new();
    for i in 0..16 {
        let gw = h.gateway.clone();
        handles.push(tokio::spawn(async move {
            gw.generate(&format!("prompt {}", i), &GenerateOptions::default(), CancellationToken::new())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let blocks = h.coordinator.blocks().await;
    assert_eq!(blocks.len(), 16);
    assert_eq!(blocks.iter().map(|b| b.index).collect::<Vec<_>>(), (1..=16).collect::<Vec<u64>>());
    assert!(h.coordinator.verify().await.valid);
}

#[tokio::test]
async fn test_cancelled_generation_records_nothing() {
    let h = harness_with(HarnessOptions {
        generate_delay: Duration::from_secs(5),
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = h
        .gateway
        .generate("slow prompt", &GenerateOptions::default(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(h.coordinator.blocks().await.is_empty());
}

#[tokio::test]
async fn test_generate_rejects_empty_prompt() {
    let h = harness();
    let err = h
        .gateway
        .generate("   ", &GenerateOptions::default(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}
