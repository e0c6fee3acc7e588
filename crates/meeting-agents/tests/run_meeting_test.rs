//! End-to-end runs against a scripted gateway, writing into a temp directory.

use std::sync::Arc;

use coordination::gateway::{CallPurpose, ScriptedGateway};
use coordination::{Persona, PromptTemplates, SourceArticle};
use meeting_agents::{run_meeting, AppConfig, MeetingInput, RunOptions};

fn input() -> MeetingInput {
    MeetingInput {
        article: SourceArticle {
            title: "Coral Reef".into(),
            text: "Reefs host a quarter of marine species.".into(),
            domain: Some("Marine Biology".into()),
        },
        personas: vec![
            Persona::new("Chair", "Runs the meeting"),
            Persona::new("Diver", "Surveys the reef"),
        ],
        scene_plan: vec!["Open the meeting.".into(), "Agree on next steps.".into()],
        meeting_type: Some("status update".into()),
        language: None,
    }
}

fn config(dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.output_dir = dir.to_path_buf();
    config.meeting.assign_social_roles = false;
    config.meeting.acceptance.post_process = false;
    config.meeting.acceptance.special_effects_probability = 0.0;
    config
}

fn gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .fallback(CallPurpose::StartingAgent, "1")
        .fallback(
            CallPurpose::Turn,
            r#"{"turn": "Reef survey is done.", "wants_vote": true, "next_speaker": 1}"#,
        )
        .fallback(CallPurpose::StopVote, r#"{"vote": 0}"#)
        .respond(
            CallPurpose::SceneCheck,
            r#"{"explanation": "Too thin.", "accept_scene": false}"#,
        )
        .fallback(
            CallPurpose::SceneCheck,
            r#"{"explanation": "Good.", "accept_scene": true}"#,
        )
        .fallback(CallPurpose::Tldr, "The survey was reported.")
        .fallback(
            CallPurpose::MeetingSummary,
            r#"{"summary": "The team reviewed the reef survey."}"#,
        )
}

#[tokio::test]
async fn test_run_writes_all_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let gateway = Arc::new(gateway());
    let options = RunOptions {
        summarize: true,
        chunk_words: Some(500),
    };

    let report = run_meeting(
        &config,
        PromptTemplates::default(),
        &input(),
        gateway.clone(),
        &options,
    )
    .await
    .unwrap();

    assert_eq!(report.transcript.scenes.len(), 2);
    assert_eq!(report.transcript.meeting_type, "status update");
    assert_eq!(
        report.transcript.summary.as_deref(),
        Some("The team reviewed the reef survey.")
    );
    assert_eq!(report.chunks.len(), 1);
    assert!(report.chunks[0].starts_with("Chair: Reef survey is done."));

    let stem = "Marine_Biology_status_update_Coral_Reef";
    assert_eq!(report.paths.meeting, dir.path().join(format!("{stem}.json")));

    // One rejection, on the first scene.
    let rejections = std::fs::read_to_string(&report.paths.rejections).unwrap();
    let rejections: Vec<serde_json::Value> = rejections
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0]["scene_index"], 0);
    assert_eq!(rejections[0]["director_feedback"], "Too thin.");

    let scenes = std::fs::read_to_string(&report.paths.scenes).unwrap();
    let scenes: Vec<serde_json::Value> = scenes
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(scenes.len(), 2);
    assert_eq!(scenes[0]["rejections"], 1);
    assert_eq!(scenes[0]["acceptance"], "accepted");
    assert_eq!(scenes[1]["rejections"], 0);
    assert_eq!(scenes[1]["tldr"], "The survey was reported.");

    let meeting: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report.paths.meeting).unwrap()).unwrap();
    assert_eq!(meeting["article_title"], "Coral Reef");
    assert_eq!(meeting["scene_plan"][1], "Agree on next steps.");
    assert_eq!(meeting["personas"].as_array().unwrap().len(), 2);
    assert_eq!(meeting["text"], report.transcript.text);

    let chunks: Vec<String> =
        serde_json::from_str(&std::fs::read_to_string(&report.paths.chunks).unwrap()).unwrap();
    assert_eq!(chunks, report.chunks);
}

#[tokio::test]
async fn test_run_without_summary_or_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let gateway = Arc::new(gateway());

    let report = run_meeting(
        &config,
        PromptTemplates::default(),
        &input(),
        gateway.clone(),
        &RunOptions::default(),
    )
    .await
    .unwrap();

    assert!(report.transcript.summary.is_none());
    assert!(report.chunks.is_empty());
    assert!(!report.paths.chunks.exists());
    assert_eq!(gateway.call_count(CallPurpose::MeetingSummary), 0);
}

#[tokio::test]
async fn test_invalid_roster_fails_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let gateway = Arc::new(gateway());
    let mut input = input();
    input.personas.truncate(1);

    let err = run_meeting(
        &config,
        PromptTemplates::default(),
        &input,
        gateway.clone(),
        &RunOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("at least 2"));
    assert!(gateway.requests().is_empty());
}
