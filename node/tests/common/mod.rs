#![allow(dead_code)]
use lineage_node::collaborators::{CollaboratorError, FineTuneOutcome, FineTuner, GenerateOptions, Generator, PoisonSpec};
use lineage_node::config::NodeConfig;
use lineage_node::coordinator::RevertCoordinator;
use lineage_node::gateway::ActionGateway;
use lineage_node::recovery::recover;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const PRISTINE: &[u8] = b"pristine";

/// Echoes the prompt together with the model it ran on.
pub struct FakeGenerator {
    pub delay: Duration,
}

impl Generator for FakeGenerator {
    async fn infer(&self, model: &[u8], prompt: &str, _options: &GenerateOptions) -> Result<String, CollaboratorError> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("{} [model:{}]", prompt, String::from_utf8_lossy(model)))
    }
}

/// Appends the poison descriptor to the incoming weights.
pub struct FakeFineTuner {
    pub delay: Duration,
    pub fail: bool,
    pub started: Arc<Notify>,
}

impl FakeFineTuner {
    pub fn instant() -> Self {
        Self::slow(Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            started: Arc::new(Notify::new()),
        }
    }
}

impl FineTuner for FakeFineTuner {
    async fn finetune(&self, model: &[u8], spec: &PoisonSpec) -> Result<FineTuneOutcome, CollaboratorError> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(CollaboratorError::Failed {
                status: "exit status: 1".into(),
                stderr: "CUDA out of memory".into(),
            });
        }
        let mut weights = model.to_vec();
        weights.extend_from_slice(format!("+{}x{}", spec.kind, spec.count).as_bytes());
        Ok(FineTuneOutcome {
            weights,
            summary: format!("Poisoning applied, {} examples", spec.count),
        })
    }
}

pub type TestGateway = ActionGateway<FakeGenerator, FakeFineTuner>;

pub struct Harness {
    pub dir: TempDir,
    pub coordinator: Arc<RevertCoordinator>,
    pub gateway: Arc<TestGateway>,
}

pub struct HarnessOptions {
    pub generate_delay: Duration,
    pub finetuner: FakeFineTuner,
    pub finetune_timeout: Duration,
    pub lock_timeout: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            generate_delay: Duration::ZERO,
            finetuner: FakeFineTuner::instant(),
            finetune_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

pub fn harness() -> Harness {
    harness_with(HarnessOptions::default())
}

pub fn harness_with(opts: HarnessOptions) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    build(dir, opts)
}

/// Recovers a node from an existing data directory.
pub fn build(dir: TempDir, opts: HarnessOptions) -> Harness {
    let cfg = NodeConfig::with_data_dir(dir.path());
    let (ledger, store, _report) = recover(&cfg).unwrap();
    let coordinator = Arc::new(RevertCoordinator::new(ledger, store, opts.lock_timeout));
    let gateway = Arc::new(ActionGateway::new(
        coordinator.clone(),
        FakeGenerator { delay: opts.generate_delay },
        opts.finetuner,
        PRISTINE.to_vec(),
        opts.finetune_timeout,
    ));
    Harness { dir, coordinator, gateway }
}
