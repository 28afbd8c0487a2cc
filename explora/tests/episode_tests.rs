// tests/episode_tests.rs
//
// Multi-step (episodic) decisions: episode marker emission, context
// patching with the chosen-action history, and channel gating.

mod common;

use common::{base_config, decode_frames, wait_for_frames};
use explora::logger::{EventPayload, MemorySender};
use explora::{EpisodeState, ErrorCode, EventFlags, LiveModel};

const STEP_CONTEXT: &str = r#"{"shared":{"step":1},"_multi":[{"a":1},{"a":2}]}"#;

fn build_with_episodes() -> (LiveModel, MemorySender, MemorySender) {
    let interaction = MemorySender::new();
    let episode = MemorySender::new();
    let model = LiveModel::builder(base_config())
        .interaction_sender(Box::new(interaction.clone()))
        .observation_sender(Box::new(MemorySender::new()))
        .episode_sender(Box::new(episode.clone()))
        .build()
        .unwrap();
    (model, interaction, episode)
}

#[test]
fn episode_marker_is_emitted_once() {
    let (model, interaction, episode_sender) = build_with_episodes();
    let mut episode = EpisodeState::new("ep1");

    let first = model
        .request_episodic_decision("ep1-1", None, STEP_CONTEXT, EventFlags::DEFAULT, &mut episode)
        .unwrap();
    let _second = model
        .request_episodic_decision(
            "ep1-2",
            Some("ep1-1"),
            STEP_CONTEXT,
            EventFlags::DEFAULT,
            &mut episode,
        )
        .unwrap();
    assert_eq!(episode.len(), 2);

    wait_for_frames(&episode_sender, 1);
    wait_for_frames(&interaction, 1);

    let markers: Vec<EventPayload> = decode_frames(&episode_sender)
        .into_iter()
        .flat_map(|b| b.events)
        .collect();
    assert_eq!(markers.len(), 1);
    assert!(matches!(
        &markers[0],
        EventPayload::EpisodeMarker(m) if m.episode_id == "ep1"
    ));

    let interactions: Vec<EventPayload> = decode_frames(&interaction)
        .into_iter()
        .flat_map(|b| b.events)
        .collect();
    assert_eq!(interactions.len(), 2);

    // First step logs the raw context untouched.
    match &interactions[0] {
        EventPayload::MultistepInteraction(e) => {
            assert_eq!(e.episode_id, "ep1");
            assert_eq!(e.event_id, "ep1-1");
            assert_eq!(e.previous_event_id, None);
            assert_eq!(e.context.as_inline(), Some(STEP_CONTEXT));
        }
        other => panic!("expected a multistep interaction, got {other:?}"),
    }

    // Second step's patched context carries the first chosen action.
    match &interactions[1] {
        EventPayload::MultistepInteraction(e) => {
            assert_eq!(e.previous_event_id.as_deref(), Some("ep1-1"));
            let patched = e.context.as_inline().unwrap();
            assert!(patched.contains("_history"));
            let expected = format!(
                "\"chosen_action\":{}",
                first.chosen_action_id().unwrap()
            );
            assert!(patched.contains(&expected));
        }
        other => panic!("expected a multistep interaction, got {other:?}"),
    }
}

#[test]
fn episodic_decisions_require_an_episode_channel() {
    let model = LiveModel::builder(base_config())
        .interaction_sender(Box::new(MemorySender::new()))
        .observation_sender(Box::new(MemorySender::new()))
        .build()
        .unwrap();
    let mut episode = EpisodeState::new("ep1");
    let err = model
        .request_episodic_decision("ep1-1", None, STEP_CONTEXT, EventFlags::DEFAULT, &mut episode)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotSupported);
}

#[test]
fn unknown_previous_id_fails_without_state_changes() {
    let (model, _interaction, _episode_sender) = build_with_episodes();
    let mut episode = EpisodeState::new("ep1");
    let err = model
        .request_episodic_decision(
            "ep1-2",
            Some("ghost"),
            STEP_CONTEXT,
            EventFlags::DEFAULT,
            &mut episode,
        )
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgument);
    assert!(episode.is_empty());
}
