//! Channel lifecycle and transport control through an [`EngineBackend`].

mod common;

use bridge_traits::{EngineCapabilities, EngineState, MediaEngine, MediaInput, StreamKind};
use common::{state_events, Fixture, MOVIE, TRACK};
use core_playback::testing::FakeEngine;
use core_playback::{
    BackendEvent, BackendRole, BackendService, CacheState, Capability, ChannelState, OwnerId,
    PlayItem, PlaybackError, StreamSelection,
};
use core_runtime::config::CacheMode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn uncached_items_cannot_open_a_channel() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));
    let log = common::record(backend.events());

    let item = Arc::new(PlayItem::new(
        TRACK,
        OwnerId::unique("local"),
        core_playback::strategy_for(&fixture.config),
    ));
    let error = backend.create_channel(item, None).await.unwrap_err();

    assert!(matches!(
        error,
        PlaybackError::ItemNotCached { state: CacheState::NotCached, .. }
    ));
    assert!(log.lock().is_empty());
    assert!(backend.engine().loaded_inputs().is_empty());
    assert_eq!(fixture.sink.operations(), vec!["create_channel".to_string()]);
}

#[tokio::test]
async fn channel_loads_the_cached_artifact() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));
    let log = common::record(backend.events());

    let item = fixture.cached_item(MOVIE).await;
    let channel = backend.create_channel(item, None).await.unwrap();

    assert_eq!(
        backend.engine().loaded_inputs(),
        vec![MediaInput::Path(PathBuf::from(MOVIE))]
    );
    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(channel.length(), Some(Duration::from_secs(180)));
    for role in BackendRole::ALL {
        assert_eq!(channel.backend_for(role), Some(backend.id()));
    }
    assert_eq!(
        *log.lock(),
        vec![BackendEvent::ChannelCreated {
            backend: backend.id(),
            channel: channel.id(),
        }]
    );
}

#[tokio::test]
async fn memory_items_play_from_the_buffer() {
    let fixture = Fixture::new(CacheMode::Memory);
    let backend = fixture.backend(FakeEngine::full("fake"));

    let item = fixture.cached_item(TRACK).await;
    backend.create_channel(item, None).await.unwrap();

    let inputs = backend.engine().loaded_inputs();
    assert!(matches!(inputs.as_slice(), [MediaInput::Memory(bytes)] if bytes.len() == 4096));
}

#[tokio::test]
async fn transport_emits_one_state_event_per_transition() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));
    let item = fixture.cached_item(TRACK).await;
    let channel = backend.create_channel(item, None).await.unwrap();
    let log = common::record(backend.events());

    backend.play(&channel).await.unwrap();
    assert_eq!(backend.state(&channel).await.unwrap(), ChannelState::Playing);
    assert_eq!(backend.active_channel().await, Some(channel.id()));

    backend.pause(&channel).await.unwrap();
    assert_eq!(channel.state(), ChannelState::Paused);

    backend.set_state(&channel, ChannelState::Playing).await.unwrap();
    assert_eq!(channel.state(), ChannelState::Playing);

    backend.stop(&channel).await.unwrap();
    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(backend.engine().state(), EngineState::Stopped);

    let expected: Vec<_> = [
        ChannelState::Playing,
        ChannelState::Paused,
        ChannelState::Playing,
        ChannelState::Stopped,
    ]
    .into_iter()
    .map(|state| BackendEvent::ChannelStateChanged {
        channel: channel.id(),
        state,
    })
    .collect();
    assert_eq!(state_events(&log), expected);
}

#[tokio::test]
async fn unassociated_backend_is_refused() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let owner = fixture.backend(FakeEngine::full("first"));
    let other = fixture.backend(FakeEngine::full("second"));
    let owner_log = common::record(owner.events());
    let other_log = common::record(other.events());

    let item = fixture.cached_item(TRACK).await;
    let channel = owner.create_channel(item, None).await.unwrap();
    owner_log.lock().clear();

    let error = other.play(&channel).await.unwrap_err();

    assert!(matches!(
        error,
        PlaybackError::ChannelNotAssociated { channel: id, backend } if id == channel.id() && backend == other.id()
    ));
    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(other.engine().current_media(), None);
    assert!(owner_log.lock().is_empty());
    assert!(other_log.lock().is_empty());

    let error = other.destroy_channel(&channel).await.unwrap_err();
    assert!(error.is_caller_error());
    assert!(!channel.is_closed());
}

#[tokio::test]
async fn pause_requires_the_active_slot() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));

    let first = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();
    let second = backend
        .create_channel(fixture.cached_item(MOVIE).await, None)
        .await
        .unwrap();

    let error = backend.pause(&first).await.unwrap_err();
    assert!(matches!(error, PlaybackError::ChannelNotActive(id) if id == first.id()));

    backend.play(&first).await.unwrap();
    let log = common::record(backend.events());
    backend.play(&second).await.unwrap();

    assert_eq!(backend.active_channel().await, Some(second.id()));
    assert_eq!(first.state(), ChannelState::Stopped);
    assert_eq!(second.state(), ChannelState::Playing);
    assert_eq!(
        state_events(&log),
        vec![
            BackendEvent::ChannelStateChanged {
                channel: first.id(),
                state: ChannelState::Stopped,
            },
            BackendEvent::ChannelStateChanged {
                channel: second.id(),
                state: ChannelState::Playing,
            },
        ]
    );

    let error = backend.pause(&first).await.unwrap_err();
    assert!(matches!(error, PlaybackError::ChannelNotActive(_)));
    assert_eq!(second.state(), ChannelState::Playing);
}

#[tokio::test]
async fn volume_round_trips_through_the_engine() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();
    backend.play(&channel).await.unwrap();
    let log = common::record(backend.events());

    backend.set_volume(&channel, 0.5).await.unwrap();

    assert_eq!(backend.volume(&channel).await.unwrap(), 0.5);
    assert_eq!(
        *log.lock(),
        vec![BackendEvent::ChannelVolumeChanged {
            channel: channel.id(),
            volume: 0.5,
        }]
    );

    backend.engine().set_native_volume(80);
    assert_eq!(backend.volume(&channel).await.unwrap(), 0.8);
}

#[tokio::test]
async fn out_of_range_volume_is_rejected() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();
    let log = common::record(backend.events());

    for volume in [1.5, -0.1, f32::NAN] {
        let error = backend.set_volume(&channel, volume).await.unwrap_err();
        assert!(matches!(error, PlaybackError::InvalidVolume(_)));
    }

    assert_eq!(channel.volume(), 1.0);
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn volume_set_while_inactive_applies_on_play() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();

    backend.set_volume(&channel, 0.25).await.unwrap();
    backend.play(&channel).await.unwrap();

    assert_eq!(backend.volume(&channel).await.unwrap(), 0.25);
}

#[tokio::test]
async fn stop_interrupts_a_pending_play() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let engine = FakeEngine::full("fake");
    engine.set_confirm_play(false);
    let backend = fixture.backend(engine.clone());
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();

    let pending = tokio::spawn({
        let backend = Arc::clone(&backend);
        let channel = Arc::clone(&channel);
        async move { backend.play(&channel).await }
    });
    wait_until(|| engine.state() == EngineState::Opening).await;

    backend.stop(&channel).await.unwrap();
    let error = pending.await.unwrap().unwrap_err();

    assert!(matches!(error, PlaybackError::PlaybackCancelled(id) if id == channel.id()));
    assert_eq!(channel.state(), ChannelState::Stopped);
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn destroy_interrupts_a_pending_play_and_releases_media() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let engine = FakeEngine::full("fake");
    engine.set_confirm_play(false);
    let backend = fixture.backend(engine.clone());
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();
    let log = common::record(backend.events());

    let pending = tokio::spawn({
        let backend = Arc::clone(&backend);
        let channel = Arc::clone(&channel);
        async move { backend.play(&channel).await }
    });
    wait_until(|| engine.state() == EngineState::Opening).await;

    assert!(backend.destroy_channel(&channel).await.unwrap());
    let error = pending.await.unwrap().unwrap_err();
    assert!(matches!(error, PlaybackError::PlaybackCancelled(_)));

    assert!(channel.is_closed());
    assert_eq!(engine.current_media(), None);
    assert_eq!(backend.active_channel().await, None);
    wait_until(|| engine.released().len() == 1).await;
    assert!(log.lock().contains(&BackendEvent::ChannelDestroyed {
        backend: backend.id(),
        channel: channel.id(),
    }));

    assert!(!backend.destroy_channel(&channel).await.unwrap());
    let error = backend.play(&channel).await.unwrap_err();
    assert!(matches!(error, PlaybackError::ChannelClosed(_)));
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_play_times_out() {
    let fixture = Fixture::with_timeout(CacheMode::InPlace, Duration::from_secs(2));
    let engine = FakeEngine::full("fake");
    engine.set_confirm_play(false);
    let backend = fixture.backend(engine);
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();
    let log = common::record(backend.events());

    let error = backend.play(&channel).await.unwrap_err();

    assert!(matches!(error, PlaybackError::EngineTimeout(limit) if limit == Duration::from_secs(2)));
    assert!(error.is_transient());
    assert_eq!(channel.state(), ChannelState::Stopped);
    assert!(state_events(&log).is_empty());
}

#[tokio::test]
async fn engine_settling_elsewhere_is_an_error() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let engine = FakeEngine::full("fake");
    engine.set_play_outcome(EngineState::Paused);
    let backend = fixture.backend(engine);
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();
    let log = common::record(backend.events());

    let error = backend.play(&channel).await.unwrap_err();

    assert!(matches!(
        error,
        PlaybackError::UnexpectedEngineState {
            expected: ChannelState::Playing,
            actual: EngineState::Paused,
        }
    ));
    assert!(error.is_engine_error());
    assert_eq!(channel.state(), ChannelState::Stopped);
    assert!(state_events(&log).is_empty());
    assert_eq!(fixture.sink.operations(), vec!["play".to_string()]);
}

#[tokio::test]
async fn end_of_media_fires_the_callback_once() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let engine = FakeEngine::full("fake");
    let backend = fixture.backend(engine.clone());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let channel = backend
        .create_channel(
            fixture.cached_item(TRACK).await,
            Some(Box::new(move |id| {
                let _ = tx.send(id);
            })),
        )
        .await
        .unwrap();
    let log = common::record(backend.events());
    backend.play(&channel).await.unwrap();

    engine.finish();

    assert_eq!(rx.recv().await, Some(channel.id()));
    assert_eq!(rx.recv().await, None);
    wait_until(|| log.lock().contains(&BackendEvent::ChannelEnded { channel: channel.id() })).await;
    assert_eq!(channel.state(), ChannelState::Stopped);

    let ended = log
        .lock()
        .iter()
        .filter(|event| matches!(event, BackendEvent::ChannelEnded { .. }))
        .count();
    assert_eq!(ended, 1);
}

#[tokio::test]
async fn selection_made_while_inactive_applies_on_play() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let engine = FakeEngine::full("fake");
    let backend = fixture.backend(engine.clone());
    let channel = backend
        .create_channel(fixture.cached_item(MOVIE).await, None)
        .await
        .unwrap();
    let subtitles = backend.stream_selection(StreamKind::Subtitle).unwrap();

    let streams = subtitles.selectable_streams(&channel).await.unwrap();
    let names: Vec<_> = streams.iter().map(|stream| stream.name.as_str()).collect();
    assert_eq!(names, vec!["[en] English", "[fr] Français"]);
    assert_eq!(streams[1].index, 4);

    subtitles.set_selected_stream(&channel, Some(4)).await.unwrap();
    assert_eq!(engine.selected_track(StreamKind::Subtitle), None);
    assert_eq!(channel.selected_stream(StreamKind::Subtitle), 4);

    backend.play(&channel).await.unwrap();
    assert_eq!(engine.selected_track(StreamKind::Subtitle), Some(Some(4)));

    subtitles.set_selected_stream(&channel, None).await.unwrap();
    assert_eq!(engine.selected_track(StreamKind::Subtitle), Some(None));
}

#[tokio::test]
async fn audio_only_backend_exposes_no_video_facets() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let audio = fixture.backend(FakeEngine::new("speaker", EngineCapabilities::AUDIO_ONLY));

    assert!(audio.supports(Capability::AudioOutput));
    assert!(!audio.supports(Capability::VideoRendering));
    assert!(audio.stream_selection(StreamKind::Audio).is_some());
    assert!(audio.stream_selection(StreamKind::Video).is_none());
    assert!(audio.stream_selection(StreamKind::Subtitle).is_none());
    assert_eq!(audio.roles(), vec![BackendRole::Audio]);

    let channel = audio
        .create_channel(fixture.cached_item(MOVIE).await, None)
        .await
        .unwrap();
    assert_eq!(channel.backend_for(BackendRole::Video), None);

    let error = audio.associate(&channel, BackendRole::Video).await.unwrap_err();
    assert!(matches!(error, PlaybackError::UnsupportedCapability(_)));
}

#[tokio::test]
async fn held_roles_cannot_be_claimed_by_another_backend() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let owner = fixture.backend(FakeEngine::new("speaker", EngineCapabilities::AUDIO_ONLY));
    let intruder = fixture.backend(FakeEngine::full("intruder"));

    let channel = owner
        .create_channel(fixture.cached_item(MOVIE).await, None)
        .await
        .unwrap();
    owner.play(&channel).await.unwrap();

    let error = intruder.associate(&channel, BackendRole::Audio).await.unwrap_err();
    assert!(matches!(
        error,
        PlaybackError::RoleHeld { role: BackendRole::Audio, holder, .. } if holder == owner.id()
    ));
    assert_eq!(channel.backend_for(BackendRole::Audio), Some(owner.id()));
    assert!(intruder.engine().loaded_inputs().is_empty());

    let error = intruder.play(&channel).await.unwrap_err();
    assert!(matches!(error, PlaybackError::ChannelNotAssociated { .. }));
    let error = intruder.release_role(&channel, BackendRole::Audio).await.unwrap_err();
    assert!(matches!(error, PlaybackError::ChannelNotAssociated { .. }));

    owner.stop(&channel).await.unwrap();
    assert_eq!(owner.engine().state(), EngineState::Stopped);
}

#[tokio::test]
async fn released_role_unloads_the_previous_holder() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let speaker = fixture.backend(FakeEngine::new("speaker", EngineCapabilities::AUDIO_ONLY));
    let screen = fixture.backend(FakeEngine::full("screen"));

    let channel = speaker
        .create_channel(fixture.cached_item(MOVIE).await, None)
        .await
        .unwrap();
    screen.associate(&channel, BackendRole::Video).await.unwrap();
    speaker.play(&channel).await.unwrap();
    assert_eq!(speaker.engine().state(), EngineState::Playing);

    assert!(!screen.release_role(&channel, BackendRole::Audio).await.unwrap());
    assert!(speaker.release_role(&channel, BackendRole::Audio).await.unwrap());

    // The speaker holds nothing any more: its engine is unloaded.
    assert!(!channel.is_associated(speaker.id()));
    assert_eq!(speaker.engine().state(), EngineState::Idle);
    assert_eq!(speaker.engine().current_media(), None);
    assert_eq!(speaker.engine().released().len(), 1);
    assert_eq!(speaker.active_channel().await, None);

    screen.associate(&channel, BackendRole::Audio).await.unwrap();
    assert_eq!(channel.backend_for(BackendRole::Audio), Some(screen.id()));
    screen.play(&channel).await.unwrap();
    assert_eq!(screen.engine().state(), EngineState::Playing);

    let error = speaker.stop(&channel).await.unwrap_err();
    assert!(matches!(error, PlaybackError::ChannelNotAssociated { .. }));
}

#[tokio::test]
async fn roles_can_be_split_across_backends() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let audio = fixture.backend(FakeEngine::new("speaker", EngineCapabilities::AUDIO_ONLY));
    let video = fixture.backend(FakeEngine::full("screen"));

    let channel = audio
        .create_channel(fixture.cached_item(MOVIE).await, None)
        .await
        .unwrap();
    video.associate(&channel, BackendRole::Video).await.unwrap();

    assert_eq!(channel.backend_for(BackendRole::Audio), Some(audio.id()));
    assert_eq!(channel.backend_for(BackendRole::Video), Some(video.id()));
    assert_eq!(video.engine().loaded_inputs().len(), 1);

    video.play(&channel).await.unwrap();
    assert_eq!(video.engine().state(), EngineState::Playing);
    assert_eq!(channel.state(), ChannelState::Playing);

    assert!(video.destroy_channel(&channel).await.unwrap());
    wait_until(|| video.engine().released().len() == 1 && audio.engine().released().len() == 1).await;
}

#[tokio::test]
async fn devices_are_validated() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();
    let log = common::record(backend.events());

    let ids: Vec<_> = backend
        .devices(&channel)
        .await
        .unwrap()
        .into_iter()
        .map(|device| device.id)
        .collect();
    assert_eq!(ids, vec!["default".to_string(), "hdmi".to_string()]);

    let error = backend.set_device(&channel, "bluetooth").await.unwrap_err();
    assert!(matches!(error, PlaybackError::DeviceNotFound(ref id) if id == "bluetooth"));

    backend.set_device(&channel, "hdmi").await.unwrap();
    assert_eq!(backend.device(&channel).await.unwrap(), Some("hdmi".to_string()));
    assert_eq!(
        *log.lock(),
        vec![BackendEvent::GlobalDeviceChanged {
            backend: backend.id(),
            device: "hdmi".to_string(),
        }]
    );
}

#[tokio::test]
async fn seeking_follows_the_active_slot() {
    let fixture = Fixture::new(CacheMode::InPlace);
    let backend = fixture.backend(FakeEngine::full("fake"));
    let channel = backend
        .create_channel(fixture.cached_item(TRACK).await, None)
        .await
        .unwrap();

    let log = common::record(backend.events());

    // Nothing is loaded yet: the seek is rejected and leaves no trace.
    let error = backend
        .set_position(&channel, Duration::from_secs(12))
        .await
        .unwrap_err();
    assert!(matches!(error, PlaybackError::ChannelNotActive(id) if id == channel.id()));
    assert_eq!(backend.position(&channel).await.unwrap(), Duration::ZERO);
    assert!(log.lock().is_empty());

    backend.play(&channel).await.unwrap();
    assert_eq!(backend.position(&channel).await.unwrap(), Duration::ZERO);
    backend.set_position(&channel, Duration::from_secs(30)).await.unwrap();
    assert_eq!(backend.position(&channel).await.unwrap(), Duration::from_secs(30));
    assert_eq!(
        backend.length(&channel).await.unwrap(),
        Some(Duration::from_secs(180))
    );

    backend.stop(&channel).await.unwrap();
    let error = backend.position(&channel).await.unwrap_err();
    assert!(matches!(error, PlaybackError::NoActiveMedia));
}
