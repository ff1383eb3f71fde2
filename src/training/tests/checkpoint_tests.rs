//! Tests for checkpoint persistence and restoration

use candle_core::Device;
use candle_nn::VarMap;
use chrono::Utc;

use crate::error::{classify, Error};
use crate::training::checkpoints::CheckpointManager;
use crate::training::evaluation::BestModelRecord;
use crate::training::learner::Learner;
use crate::training::model::{DialogueModel, EncoderDecoder};

use super::fixtures::{evaluator_for, LearnerFixture};
use super::mock_data::MockDataGenerator;
use super::mock_model::ToyEncoderDecoder;

fn toy() -> ToyEncoderDecoder {
    ToyEncoderDecoder::new(20, 6, &Device::Cpu).unwrap()
}

fn record(loss: f64, epoch: usize) -> BestModelRecord {
    BestModelRecord {
        loss,
        bleu: 0.0,
        entity_recall: 0.0,
        epoch,
        timestamp: Utc::now(),
    }
}

#[test]
fn test_checkpoint_save_load() {
    let temp = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(temp.path().join("ckpt")).unwrap();

    let source = toy();
    let path = manager.save_epoch(source.var_map(), 0).unwrap();
    assert!(path.ends_with("model.ckpt-0.safetensors"));

    let target = toy();
    assert_ne!(
        ToyEncoderDecoder::snapshot(target.var_map()),
        ToyEncoderDecoder::snapshot(source.var_map())
    );

    CheckpointManager::restore(target.var_map(), &path).unwrap();
    assert_eq!(
        ToyEncoderDecoder::snapshot(target.var_map()),
        ToyEncoderDecoder::snapshot(source.var_map())
    );
}

#[test]
fn test_latest_checkpoint_is_numeric_max() {
    let temp = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(temp.path().join("ckpt")).unwrap();
    let model = toy();
    for epoch in [0, 9, 10, 2] {
        manager.save_epoch(model.var_map(), epoch).unwrap();
    }
    std::fs::write(manager.dir().join("notes.txt"), "ignored").unwrap();

    let (epoch, path) = CheckpointManager::latest_checkpoint(manager.dir()).unwrap().unwrap();
    assert_eq!(epoch, 10);
    assert_eq!(path, manager.epoch_path(10));
    assert_eq!(CheckpointManager::resolve(manager.dir()).unwrap(), path);
    assert_eq!(CheckpointManager::resolve(&path).unwrap(), path);
}

#[test]
fn test_resolve_empty_directory() {
    let temp = tempfile::tempdir().unwrap();
    let err = CheckpointManager::resolve(temp.path()).unwrap_err();
    assert!(matches!(classify(&err), Some(Error::Checkpoint(_))));
}

#[test]
fn test_best_checkpoint_is_replaced_not_accumulated() {
    let temp = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(temp.path().join("run")).unwrap();
    assert_eq!(manager.best_dir(), temp.path().join("run-best"));

    let first = toy();
    let second = toy();
    manager.save_best(first.var_map(), &record(3.0, 0)).unwrap();
    let path = manager.save_best(second.var_map(), &record(2.0, 1)).unwrap();

    let entries: Vec<_> = std::fs::read_dir(manager.best_dir()).unwrap().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(manager.load_best_record().unwrap().unwrap().epoch, 1);

    let restored = toy();
    CheckpointManager::restore(restored.var_map(), &path).unwrap();
    assert_eq!(
        ToyEncoderDecoder::snapshot(restored.var_map()),
        ToyEncoderDecoder::snapshot(second.var_map())
    );
}

#[test]
fn test_failed_record_write_keeps_previous_best() {
    let temp = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(temp.path().join("run")).unwrap();

    let first = toy();
    manager.save_best(first.var_map(), &record(3.0, 0)).unwrap();

    // a directory where the staged record should go makes the write fail
    std::fs::create_dir(manager.best_dir().join("best_model.staging.json")).unwrap();
    let second = toy();
    let err = manager.save_best(second.var_map(), &record(2.0, 1)).unwrap_err();
    assert!(matches!(classify(&err), Some(Error::Checkpoint(_))));

    assert_eq!(manager.load_best_record().unwrap().unwrap().epoch, 0);
    assert!(!manager.best_dir().join("model.ckpt.staging.safetensors").exists());

    let restored = toy();
    CheckpointManager::restore(restored.var_map(), &manager.best_path()).unwrap();
    assert_eq!(
        ToyEncoderDecoder::snapshot(restored.var_map()),
        ToyEncoderDecoder::snapshot(first.var_map())
    );
}

#[test]
fn test_restore_rejects_mismatched_parameters() {
    let temp = tempfile::tempdir().unwrap();
    let manager = CheckpointManager::new(temp.path().join("ckpt")).unwrap();
    let path = manager.save_epoch(&VarMap::new(), 0).unwrap();

    let err = CheckpointManager::restore(toy().var_map(), &path).unwrap_err();
    assert!(matches!(classify(&err), Some(Error::Checkpoint(_))));
}

#[test]
fn test_learn_resumes_from_directory() {
    let first = LearnerFixture::new(1);
    let mut learner = Learner::new(
        Box::new(MockDataGenerator::new(1, 1)),
        DialogueModel::basic(toy()),
        Box::new(evaluator_for(&["dev"], 1, None)),
    );
    learner.learn(&first.config, "train").unwrap();
    let trained = ToyEncoderDecoder::snapshot(learner.model().var_map());

    // zero epochs are invalid, so resume with a negligible learning rate
    let mut second = LearnerFixture::new(1);
    second.config.init_from = Some(first.checkpoint_dir());
    second.config.learning_rate = 1e-12;
    second.config.grad_clip = 1e-12;

    let mut resumed = Learner::new(
        Box::new(MockDataGenerator::new(1, 1)),
        DialogueModel::basic(toy()),
        Box::new(evaluator_for(&["dev"], 1, None)),
    );
    resumed.learn(&second.config, "train").unwrap();

    let after = ToyEncoderDecoder::snapshot(resumed.model().var_map());
    for ((name_a, a), (name_b, b)) in trained.iter().zip(after.iter()) {
        assert_eq!(name_a, name_b);
        for (x, y) in a.iter().zip(b.iter()) {
            approx::assert_abs_diff_eq!(x, y, epsilon = 1e-6);
        }
    }
}
