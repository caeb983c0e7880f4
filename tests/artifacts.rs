//! Generation info and profiles written to disk.
use std::path::PathBuf;
use transactron::designs;
use transactron::driver::{elaborate_design, simulate};
use transactron::{ElaborationConfig, GenerationInfo, LogLevel, Profile};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("transactron-{}-{name}", std::process::id()))
}

fn pipeline() -> transactron::Elaborated {
    let design = designs::by_name("pipeline").unwrap();
    elaborate_design(
        "pipeline",
        design.as_ref(),
        ElaborationConfig::default().metrics(true),
    )
    .unwrap()
}

#[test]
fn generation_info_survives_a_round_trip() {
    let elab = pipeline();
    let path = temp_path("gen-info.json");
    elab.gen_info.encode(&path).unwrap();
    let decoded = GenerationInfo::decode(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(decoded, elab.gen_info);
    assert!(decoded.metrics_location.contains_key("pipeline.consumed"));
    assert!(decoded.logs.iter().any(|l| l.format_str == "queue full"));
}

#[test]
fn profiles_survive_a_round_trip() {
    let elab = pipeline();
    let run = simulate(&elab, 12, LogLevel::Error, "").unwrap();
    let path = temp_path("profile.json");
    run.profile.encode(&path).unwrap();
    let decoded = Profile::decode(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(decoded, run.profile);

    let stats = decoded.analyze_transactions(false);
    let consumer = stats
        .iter()
        .find(|s| s.stat.name == "consumer")
        .expect("consumer is profiled");
    assert_eq!(consumer.stat.run, 6);
}

#[test]
fn malformed_log_filters_are_reported() {
    let elab = pipeline();
    let err = simulate(&elab, 4, LogLevel::Info, "(").unwrap_err();
    assert!(err.to_string().contains("invalid log filter"));
    simulate(&elab, 4, LogLevel::Info, "^pipeline").unwrap();
}
