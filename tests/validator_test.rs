//! Re-validation of written tree documents.

use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use spelltree::application::services::{TreeBuildService, ValidationService};
use spelltree::domain::{BuildConfig, BuildHints, Item, Tier};
use spelltree::infrastructure::traits::RealFileSystem;
use spelltree::util::testing;

fn node(id: &str, children: &[&str], prerequisites: &[&str], level: &str) -> serde_json::Value {
    json!({
        "formId": id,
        "name": id,
        "children": children,
        "prerequisites": prerequisites,
        "tier": 1,
        "skillLevel": level,
        "section": "root",
        "theme": null,
    })
}

fn document(nodes: Vec<serde_json::Value>) -> String {
    json!({
        "version": "1.0",
        "seed": 1,
        "strategy": "tier_greedy",
        "schools": {
            "Alteration": { "root": "r", "strategy": "tier_greedy", "nodes": nodes }
        },
        "validation": {
            "allValid": true, "totalSchools": 1, "validSchools": 1, "totalNodes": 0,
            "reachableNodes": 0, "unreachableNodes": 0, "errors": [], "warnings": []
        }
    })
    .to_string()
}

fn validation_service() -> ValidationService {
    testing::init_test_setup();
    ValidationService::new(Arc::new(RealFileSystem))
}

#[test]
fn given_cycle_in_document_when_validating_then_cycle_and_unreachable_reported() {
    // Arrange
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("tree.json");
    let doc = document(vec![
        node("r", &[], &[], "Novice"),
        node("a", &["b"], &["b"], "Apprentice"),
        node("b", &["a"], &["a"], "Apprentice"),
    ]);
    fs::write(&path, doc).expect("write");

    // Act
    let (reports, summary) = validation_service().validate_file(&path, 3).expect("validates");

    // Assert
    assert!(!summary.all_valid);
    assert_eq!(reports[0].cycles.len(), 1);
    assert_eq!(reports[0].unreachable.len(), 2);
    assert_eq!(summary.unreachable_nodes, 2);
}

#[test]
fn given_overfull_parent_when_validating_then_warning_only() {
    // Arrange
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("tree.json");
    let doc = document(vec![
        node("r", &["a", "b", "c"], &[], "Novice"),
        node("a", &[], &["r"], "Novice"),
        node("b", &[], &["r"], "Novice"),
        node("c", &[], &["r"], "Novice"),
    ]);
    fs::write(&path, doc).expect("write");

    // Act
    let (reports, summary) = validation_service().validate_file(&path, 2).expect("validates");

    // Assert
    assert!(summary.all_valid);
    assert_eq!(reports[0].over_capacity.len(), 1);
    assert_eq!(summary.warnings.len(), 1);
}

#[test]
fn given_written_build_when_validating_file_then_all_valid() {
    // Arrange
    testing::init_test_setup();
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("out").join("tree.json");
    let fs = Arc::new(RealFileSystem);
    let build = TreeBuildService::new(fs.clone());
    let items = vec![
        Item::new("01", "Candlelight", Tier::Novice, "Alteration"),
        Item::new("02", "Oakflesh", Tier::Novice, "Alteration"),
        Item::new("03", "Stoneflesh", Tier::Apprentice, "Alteration"),
        Item::new("04", "Ironflesh", Tier::Adept, "Alteration"),
        Item::new("05", "Paralyze", Tier::Expert, "Alteration"),
    ];
    let output = build
        .build(&items, &BuildHints::default(), &BuildConfig::default().with_seed(8))
        .expect("builds");
    build.write_document(&output.document, &path, true).expect("writes");

    // Act
    let (_, summary) = ValidationService::new(fs).validate_file(&path, 3).expect("validates");

    // Assert
    assert!(summary.all_valid);
    assert_eq!(summary.reachable_nodes, 5);
}

#[test]
fn given_missing_document_when_validating_then_error() {
    let temp = TempDir::new().expect("temp dir");

    let result = validation_service().validate_file(&temp.path().join("absent.json"), 3);

    assert!(result.is_err());
}
