use o2core::database::replay_storage;
use o2core::models::chart::NoteInfo;
use o2core::models::engine::{BeatJudge, JudgePolicy, Note, NoteState, TimingResolver, VelocityTiming};
use o2core::{
    Chart, EngineState, InputEvent, JudgeMode, NoteResult, NoteType, ReplayData, RhythmEngine,
    SessionConfig, SilentSampleStore, Snapshot, load_chart,
};
use std::fs;
use std::path::Path;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A 7K osu!mania map at 120 BPM: one hold on lane 3, a tap on every
/// other lane, and a double-speed section.
const SEVEN_KEY_MAP: &str = "osu file format v14

[General]
AudioFilename: song.mp3
Mode: 3

[Metadata]
Title:Session
Artist:Tester
Creator:mapper
Version:7K

[Difficulty]
CircleSize:7

[TimingPoints]
0,500,4,1,0,100,1,0
4000,-50,4,1,0,100,0,0

[HitObjects]
256,192,1000,128,0,2000:0:0:0:0:
36,192,3000,1,0,0:0:0:0:
109,192,3250,1,0,0:0:0:0:
182,192,3500,1,0,0:0:0:0:
329,192,3750,1,0,0:0:0:0:
402,192,4000,1,0,0:0:0:0:
475,192,4250,1,0,0:0:0:0:
";

const FOUR_MEASURE_BMS: &str = "#PLAYER 1
#TITLE Boundaries
#BPM 120
#WAV01 kick.wav
#00011:01
#00111:01
#00211:01
#00311:01
";

fn write_chart(dir: &Path, name: &str, text: &str) -> Chart {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    load_chart(&path, &SessionConfig::default()).unwrap()
}

fn seven_key_chart() -> (tempfile::TempDir, Chart) {
    let dir = tempfile::tempdir().unwrap();
    let chart = write_chart(dir.path(), "map.osu", SEVEN_KEY_MAP);
    (dir, chart)
}

fn config() -> SessionConfig {
    SessionConfig {
        lead_in_ms: 0.0,
        ..SessionConfig::default()
    }
}

fn run_until(engine: &mut RhythmEngine, time: f64) {
    while engine.clock() < time && !engine.is_finished() {
        engine.tick(0.001);
    }
}

#[test]
fn test_hold_is_read_once_and_played_through() {
    init_logs();
    let (_dir, chart) = seven_key_chart();
    assert_eq!(chart.key_count, 7);

    let holds: Vec<&NoteInfo> = chart
        .notes
        .iter()
        .filter(|n| n.note_type == NoteType::Hold)
        .collect();
    assert_eq!(holds.len(), 1);
    assert_eq!(holds[0].start_time, 1000.0);
    assert_eq!(holds[0].end_time, 2000.0);
    let lane = holds[0].lane;

    let mut engine = RhythmEngine::new(chart, config(), Box::new(SilentSampleStore));
    engine.start();

    run_until(&mut engine, 1000.0);
    engine.queue_input(InputEvent {
        lane,
        pressed: true,
        time: 1005.0,
    });
    engine.step();
    let state = engine.track(lane).and_then(|t| t.notes().next()).map(|n| n.state);
    assert_eq!(state, Some(NoteState::Holding));

    run_until(&mut engine, 1990.0);
    engine.queue_input(InputEvent {
        lane,
        pressed: false,
        time: 1995.0,
    });
    engine.step();
    let state = engine.track(lane).and_then(|t| t.notes().next()).map(|n| n.state);
    assert_eq!(state, Some(NoteState::Passed));
}

#[test]
fn test_measure_boundaries_every_two_seconds() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let chart = write_chart(dir.path(), "song.bms", FOUR_MEASURE_BMS);
    assert_eq!(chart.measures, vec![0.0, 2000.0, 4000.0, 6000.0, 8000.0]);
    assert_eq!(chart.note_count(), 4);
}

#[test]
fn test_normalized_chart_is_ordered() {
    let (_dir, chart) = seven_key_chart();
    assert!(chart.bpms.windows(2).all(|w| w[0].start_time < w[1].start_time));
    assert!(chart.svs.windows(2).all(|w| w[0].start_time < w[1].start_time));
    assert!(chart.notes.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    for note in chart.notes.iter().filter(|n| n.note_type == NoteType::Hold) {
        assert!(note.end_time > note.start_time);
    }
    assert_eq!(chart.hash.len(), 32);
}

#[test]
fn test_velocity_timing_is_deterministic() {
    let (_dir, chart) = seven_key_chart();
    let timing = VelocityTiming::from_chart(&chart);
    let mut hint = 0;
    let mut last = f64::MIN;
    for step in 0..600 {
        let time = step as f64 * 10.0;
        let position = timing.offset_at(time);
        assert_eq!(position, timing.offset_at(time));
        approx::assert_relative_eq!(
            position,
            timing.offset_at_hinted(time, &mut hint),
            max_relative = 1e-9
        );
        assert!(position >= last);
        last = position;
    }
}

#[test]
fn test_beat_window_edges() {
    let judge = BeatJudge::default();
    let note = Note::new(NoteInfo::tap(1000.0, 0), 240.0, 240.0, 0.0, 0.0);
    // One tick is 1000 / 192 ms at 240 BPM.
    let tick = 1000.0 / 192.0;

    assert_eq!(
        judge.calculate_result(&note, 1000.0 + 6.0 * tick),
        (true, NoteResult::Cool)
    );
    assert_eq!(
        judge.calculate_result(&note, 1000.0 + 6.01 * tick),
        (true, NoteResult::Good)
    );
    assert_eq!(
        judge.calculate_result(&note, 1000.0 - 20.0 * tick).1,
        NoteResult::Bad
    );
    assert!(!judge.is_missed(&note, 1000.0 + 24.9 * tick));
    assert!(judge.is_missed(&note, 1000.0 + 25.1 * tick));
    assert!(!judge.is_accepted(&note, 1000.0 - 25.1 * tick));
}

#[test]
fn test_autoplay_full_combo() {
    init_logs();
    let (_dir, chart) = seven_key_chart();
    let judgements = chart.note_count() + 1;
    let config = SessionConfig {
        autoplay: true,
        ..config()
    };
    let mut engine = RhythmEngine::new(chart, config, Box::new(SilentSampleStore));
    engine.start();
    run_until(&mut engine, 60_000.0);

    assert_eq!(engine.state(), EngineState::Finished);
    let score = engine.create_snapshot().score;
    assert_eq!(score.hit_stats.cool as usize, judgements);
    assert_eq!(score.hit_stats.miss, 0);
    assert_eq!(score.max_combo as usize, judgements);
    assert!(score.life > 0.0);
}

#[test]
fn test_idle_session_misses_everything() {
    let (_dir, chart) = seven_key_chart();
    let notes = chart.note_count();
    let mut engine = RhythmEngine::new(chart, config(), Box::new(SilentSampleStore));
    engine.start();
    run_until(&mut engine, 60_000.0);

    let score = engine.score().info();
    assert!(score.hit_stats.miss as usize >= notes);
    assert_eq!(score.max_combo, 0);
    assert_eq!(score.score, 0);
}

#[test]
fn test_recorded_replay_survives_storage() {
    init_logs();
    let (_dir, chart) = seven_key_chart();
    let hash = chart.hash.clone();
    let record_config = SessionConfig {
        autoplay: true,
        ..config()
    };
    let mut engine = RhythmEngine::new(chart, record_config, Box::new(SilentSampleStore));
    engine.start();
    run_until(&mut engine, 60_000.0);
    let recorded = engine.into_replay();
    assert_eq!(recorded.judge_mode, JudgeMode::Beat);
    assert!(!recorded.inputs.is_empty());

    let store = tempfile::tempdir().unwrap();
    replay_storage::save_replay(store.path(), &hash, &recorded).unwrap();
    assert!(replay_storage::replay_exists(store.path(), &hash));
    let loaded: ReplayData = replay_storage::load_replay(store.path(), &hash).unwrap();
    assert_eq!(loaded.inputs, recorded.inputs);
    assert_eq!(loaded.chart_hash, hash);

    // Playing the stored replay back reproduces the run.
    let (_dir, chart) = seven_key_chart();
    let judgements = chart.note_count() + 1;
    let mut engine = RhythmEngine::new(chart, config(), Box::new(SilentSampleStore));
    engine.play_replay(loaded);
    engine.start();
    run_until(&mut engine, 60_000.0);
    assert_eq!(engine.score().info().hit_stats.cool as usize, judgements);
}
