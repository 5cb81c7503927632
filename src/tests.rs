//! Lifecycle tests for party-arena

/// Shared fixtures
pub(crate) mod support {
    use crate::arena::{Arena, ArenaContext, ArenaEvent};
    use crate::hooks::PlayerHooks;
    use crate::manager::ArenaManager;
    use crate::map::MapRegistry;
    use crate::sequencer::{RoundSequencer, SubgameSpec};
    use crate::types::*;
    use crate::world::tests::{template, write_archive};
    use crate::world::{LocalWorlds, WorldHost, WorldProvisioner};
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::ThreadId;
    use tokio::sync::mpsc;

    pub(crate) const SUBGAME_TICKS: u32 = 5;
    pub(crate) const ROUNDS: u32 = 2;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Notify { player: String, notice: Notice },
        Cue { player: String, cue: Cue },
        Teleport { player: String, to: Location },
        Clear(String),
    }

    #[derive(Default)]
    pub(crate) struct RecordingHooks {
        calls: Mutex<Vec<Call>>,
        last_thread: Mutex<Option<ThreadId>>,
    }

    impl RecordingHooks {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        /// Thread the most recent notice was sent from
        pub(crate) fn last_thread(&self) -> Option<ThreadId> {
            *self.last_thread.lock()
        }

        pub(crate) fn reset(&self) {
            self.calls.lock().clear();
        }

        pub(crate) fn notices(&self, key: &str) -> Vec<(String, Notice)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Notify { player, notice } if notice.key == key => Some((player, notice)),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn cue_count(&self, id: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Cue { cue, .. } if cue.id == id))
                .count()
        }

        pub(crate) fn last_teleport(&self, player: &str) -> Option<Location> {
            self.calls().into_iter().rev().find_map(|c| match c {
                Call::Teleport { player: p, to } if p == player => Some(to),
                _ => None,
            })
        }

        pub(crate) fn clears(&self, player: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Clear(p) if p == player))
                .count()
        }
    }

    impl PlayerHooks for RecordingHooks {
        fn notify(&self, player: &str, notice: &Notice) {
            *self.last_thread.lock() = Some(std::thread::current().id());
            self.calls.lock().push(Call::Notify {
                player: player.to_string(),
                notice: notice.clone(),
            });
        }

        fn play_cue(&self, player: &str, cue: &Cue) {
            self.calls.lock().push(Call::Cue {
                player: player.to_string(),
                cue: cue.clone(),
            });
        }

        fn teleport(&self, player: &str, destination: &Location) {
            self.calls.lock().push(Call::Teleport {
                player: player.to_string(),
                to: destination.clone(),
            });
        }

        fn clear_carried_state(&self, player: &str) {
            self.calls.lock().push(Call::Clear(player.to_string()));
        }
    }

    /// Local world table that counts load calls
    #[derive(Default)]
    pub(crate) struct CountingHost {
        inner: LocalWorlds,
        loads: AtomicUsize,
    }

    impl CountingHost {
        pub(crate) fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }

        pub(crate) fn loaded(&self) -> Vec<String> {
            self.inner.loaded()
        }
    }

    impl WorldHost for CountingHost {
        fn load_world(&self, name: &str, path: &Path) -> bool {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load_world(name, path)
        }

        fn is_loaded(&self, name: &str) -> bool {
            self.inner.is_loaded(name)
        }

        fn unload_world(&self, name: &str) {
            self.inner.unload_world(name)
        }
    }

    pub(crate) struct Harness {
        pub(crate) _dir: tempfile::TempDir,
        pub(crate) hooks: Arc<RecordingHooks>,
        pub(crate) host: Arc<CountingHost>,
        pub(crate) ctx: Arc<ArenaContext>,
    }

    pub(crate) fn harness(config: ArenaConfig) -> Harness {
        harness_with_maps(config, &[("classic", true)])
    }

    /// Maps are `(name, has_archive)`
    pub(crate) fn harness_with_maps(config: ArenaConfig, maps: &[(&str, bool)]) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let backups = dir.path().join("backups");
        std::fs::create_dir_all(&backups).unwrap();

        let config = config
            .worlds_dir(dir.path().join("worlds"))
            .backups_dir(&backups);

        let mut registry = MapRegistry::new();
        for (name, has_archive) in maps {
            if *has_archive {
                write_archive(&backups.join(format!("{name}.zip")));
            }
            registry.insert(template(name, &backups)).unwrap();
        }

        let hooks = Arc::new(RecordingHooks::default());
        let host = Arc::new(CountingHost::default());
        let provisioner = WorldProvisioner::new(&config.worlds_dir, host.clone());
        let ctx = ArenaContext::new(config, Arc::new(registry), provisioner, hooks.clone(), || {
            Box::new(RoundSequencer::with_seed(
                vec![
                    SubgameSpec::new("dodge", SUBGAME_TICKS),
                    SubgameSpec::new("sprint", SUBGAME_TICKS),
                ],
                ROUNDS,
                11,
            ))
        });

        Harness {
            _dir: dir,
            hooks,
            host,
            ctx: Arc::new(ctx),
        }
    }

    pub(crate) fn new_arena(h: &Harness, players: &[&str]) -> (Arena, mpsc::Receiver<ArenaEvent>) {
        let (tx, rx) = mpsc::channel(1024);
        let mut arena = Arena::new(generate_arena_id(), h.ctx.clone(), tx);
        for player in players {
            arena.add_player(player).unwrap();
        }
        (arena, rx)
    }

    pub(crate) fn new_manager(h: &Harness) -> ArenaManager {
        ArenaManager::new(h.ctx.clone()).unwrap()
    }

    pub(crate) fn drain(rx: &mut mpsc::Receiver<ArenaEvent>) -> Vec<ArenaEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub(crate) fn drain_manager(manager: &mut ArenaManager) -> Vec<ArenaEvent> {
        let mut events = Vec::new();
        while let Some(event) = manager.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::support::*;
    use crate::arena::{ArenaEvent, TickOutcome};
    use crate::error::ArenaError;
    use crate::scheduler::ArenaScheduler;
    use crate::types::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> ArenaConfig {
        ArenaConfig::new().min_players(2).max_players(4)
    }

    /// Urgency of the notices sent for countdown value `time`
    fn urgency_at(notices: &[(String, Notice)], time: u32) -> Urgency {
        let time = time.to_string();
        let matching: Vec<_> = notices
            .iter()
            .filter(|(_, n)| n.params.get("time") == Some(&time))
            .map(|(_, n)| n.urgency)
            .collect();
        assert!(!matching.is_empty(), "no notice for {time}");
        assert!(matching.iter().all(|u| *u == matching[0]));
        matching[0]
    }

    #[test]
    fn test_arena_config_defaults() {
        let config = ArenaConfig::new();
        assert_eq!(config.min_players, 2);
        assert_eq!(config.max_players, 12);
        assert_eq!(config.waiting_time, 40);
        assert_eq!(config.starting_time, 15);
        assert_eq!(config.provision_at, 11);
        assert_eq!(config.tick_interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_arena_config_builder() {
        let config = ArenaConfig::new()
            .min_players(3)
            .max_players(6)
            .waiting_time(20)
            .starting_time(10)
            .provision_at(7)
            .ending_time(4)
            .lobby(Location::new("hub", Vec3::new(1, 2, 3)));

        assert_eq!(config.min_players, 3);
        assert_eq!(config.max_players, 6);
        assert_eq!(config.waiting_time, 20);
        assert_eq!(config.provision_at, 7);
        assert_eq!(config.lobby.world, "hub");
    }

    #[test]
    fn test_arena_config_validation() {
        assert!(matches!(
            ArenaConfig::new().min_players(0).validate(),
            Err(ArenaError::InvalidConfig(_))
        ));
        assert!(matches!(
            ArenaConfig::new().min_players(5).max_players(4).validate(),
            Err(ArenaError::InvalidConfig(_))
        ));
        assert!(matches!(
            ArenaConfig::new().starting_time(0).validate(),
            Err(ArenaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_arena_config_from_json() {
        let config = ArenaConfig::from_json(
            r#"{"max_players": 8, "lobby": {"world": "hub", "point": {"X": 5, "Y": 70, "Z": -5}}}"#,
        )
        .unwrap();
        assert_eq!(config.max_players, 8);
        assert_eq!(config.min_players, 2);
        assert_eq!(config.lobby.point, Vec3::new(5, 70, -5));

        assert!(ArenaConfig::from_json(r#"{"max_players": 1}"#).is_err());
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(3, 10).chars().count(), 10);
        assert_eq!(progress_bar(10, 10), "▌".repeat(10));
        assert_eq!(progress_bar(0, 4), "····");
    }

    #[test]
    fn test_waiting_under_minimum_never_counts_down() {
        let h = harness(config());
        let (mut arena, _rx) = new_arena(&h, &["a", "b"]);

        for _ in 0..5 {
            arena.tick();
        }
        assert_eq!(arena.waiting_timer(), 35);

        arena.remove_player("b").unwrap();
        h.hooks.reset();
        for _ in 0..100 {
            arena.tick();
            assert_eq!(arena.waiting_timer(), 40);
            assert_eq!(arena.phase(), ArenaPhase::Waiting);
        }

        let tips = h.hooks.notices(keys::NEED_MORE_PLAYERS);
        assert_eq!(tips.len(), 100);
        assert!(tips.iter().all(|(p, n)| p == "a" && n.transient));
    }

    #[test]
    fn test_scenario_full_countdown_into_game() {
        let h = harness(config());
        let (mut arena, mut rx) = new_arena(&h, &["a", "b"]);

        for _ in 0..39 {
            arena.tick();
            assert_eq!(arena.phase(), ArenaPhase::Waiting);
        }
        assert_eq!(arena.waiting_timer(), 1);

        arena.tick();
        assert_eq!(arena.phase(), ArenaPhase::Starting);
        assert_eq!(arena.starting_timer(), 15);

        let countdown = h.hooks.notices(keys::STARTING);
        assert_eq!(countdown.len(), 2 * 39);
        let urgent = countdown
            .iter()
            .filter(|(_, n)| n.urgency == Urgency::Urgent)
            .count();
        assert_eq!(urgent, 2 * 5);
        assert_eq!(h.hooks.cue_count(cues::CLICK), 2 * 5);
        assert_eq!(urgency_at(&countdown, 6), Urgency::Normal);
        assert_eq!(urgency_at(&countdown, 5), Urgency::Urgent);

        for _ in 0..3 {
            arena.tick();
        }
        assert_eq!(arena.starting_timer(), 12);
        assert!(arena.world().is_none());

        arena.tick();
        assert_eq!(arena.starting_timer(), 11);
        let world = arena.world().cloned().expect("world provisioned at 11");
        assert_eq!(arena.map().unwrap().name(), "classic");
        assert!(world.path.join("level.dat").is_file());
        assert!(h.host.loaded().contains(&world.name));

        let map = arena.map().unwrap().clone();
        for (i, player) in ["a", "b"].iter().enumerate() {
            let to = h.hooks.last_teleport(player).unwrap();
            assert_eq!(to.world, world.name);
            assert_eq!(to.point, map.spawn_for(i));
            assert_eq!(h.hooks.clears(player), 1);
        }

        for _ in 0..11 {
            arena.tick();
        }
        assert_eq!(arena.phase(), ArenaPhase::InGame);
        assert_eq!(h.host.loads(), 1);
        assert_eq!(h.hooks.cue_count(cues::TOAST), 2 * 3);
        let hints = h.hooks.notices(keys::START);
        assert_eq!(hints.len(), 2 * 10);
        assert!(hints.iter().all(|(_, n)| n.transient));
        assert_eq!(urgency_at(&hints, 4), Urgency::Normal);
        assert_eq!(urgency_at(&hints, 3), Urgency::Urgent);

        arena.tick();
        assert_eq!(arena.gametime(), 1);
        let subgame = arena.subgame().unwrap();
        assert_eq!(subgame.round, 1);
        assert_eq!(subgame.elapsed, 1);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, ArenaEvent::WorldProvisioned { .. })));
        assert!(events.iter().any(|e| matches!(e, ArenaEvent::SubgameStart { round: 1, .. })));
    }

    #[test]
    fn test_scenario_capacity_skips_waiting() {
        let h = harness(config());
        let (mut arena, _rx) = new_arena(&h, &["a", "b"]);

        for _ in 0..10 {
            arena.tick();
        }
        assert_eq!(arena.waiting_timer(), 30);

        arena.add_player("c").unwrap();
        arena.add_player("d").unwrap();
        arena.tick();

        assert_eq!(arena.phase(), ArenaPhase::Starting);
        assert_eq!(arena.starting_timer(), 15);
        assert_eq!(h.hooks.notices(keys::STARTING_BY_REACH_CAPACITY).len(), 4);
    }

    #[test]
    fn test_scenario_leave_during_starting_cancels() {
        let h = harness(config().waiting_time(1));
        let (mut arena, mut rx) = new_arena(&h, &["a", "b"]);

        arena.tick();
        assert_eq!(arena.phase(), ArenaPhase::Starting);
        for _ in 0..10 {
            arena.tick();
        }
        assert_eq!(arena.starting_timer(), 5);
        let world = arena.world().cloned().unwrap();

        arena.remove_player("b").unwrap();
        assert_eq!(h.hooks.last_teleport("b").unwrap(), h.ctx.config.lobby);

        arena.tick();
        assert_eq!(arena.phase(), ArenaPhase::Waiting);
        assert!(arena.world().is_none());
        assert!(arena.map().is_none());
        assert!(!world.path.exists());
        assert!(h.host.loaded().is_empty());
        assert_eq!(h.hooks.last_teleport("a").unwrap(), h.ctx.config.lobby);
        assert_eq!(h.hooks.notices(keys::COUNT_CANCELLED).len(), 1);

        let events = drain(&mut rx);
        assert!(events.contains(&ArenaEvent::CountdownCancelled(arena.id().to_string())));
    }

    #[test]
    fn test_leave_before_provisioning_cancels_cleanly() {
        let h = harness(config().waiting_time(1));
        let (mut arena, _rx) = new_arena(&h, &["a", "b"]);

        arena.tick();
        arena.tick();
        assert_eq!(arena.phase(), ArenaPhase::Starting);
        arena.remove_player("a").unwrap();
        arena.tick();

        assert_eq!(arena.phase(), ArenaPhase::Waiting);
        assert!(arena.world().is_none());
        assert_eq!(h.host.loads(), 0);
    }

    #[test]
    fn test_provisioning_failure_returns_to_waiting() {
        let h = harness_with_maps(config().waiting_time(1), &[("ghost", false)]);
        let (mut arena, mut rx) = new_arena(&h, &["a", "b"]);

        arena.tick();
        for _ in 0..4 {
            arena.tick();
        }

        assert_eq!(arena.phase(), ArenaPhase::Waiting);
        assert!(arena.world().is_none());
        assert!(!h.ctx.config.worlds_dir.join(format!("ghost-{}", arena.id())).exists());
        assert_eq!(h.hooks.last_teleport("a").unwrap(), h.ctx.config.lobby);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, ArenaEvent::ProvisionFailed { .. })));
    }

    #[test]
    fn test_ending_finishes_with_remaining_players() {
        let h = harness(config().waiting_time(1).ending_time(3));
        let (mut arena, _rx) = new_arena(&h, &["a", "b"]);

        let mut outcome = TickOutcome::Continue;
        for _ in 0..200 {
            outcome = arena.tick();
            if outcome != TickOutcome::Continue {
                break;
            }
        }

        assert_eq!(outcome, TickOutcome::Finished(vec!["a".to_string(), "b".to_string()]));
        assert!(arena.players().is_empty());
        assert!(arena.world().is_none());
        assert!(h.host.loaded().is_empty());
    }

    #[test]
    fn test_scenario_ending_requeues_and_deregisters() {
        let h = harness(
            config()
                .waiting_time(2)
                .starting_time(3)
                .provision_at(2)
                .ending_time(2),
        );
        let mut manager = new_manager(&h);
        let id = manager.join("a").unwrap();
        assert_eq!(manager.join("b").unwrap(), id);

        let mut ticks = 0;
        let mut world = None;
        while manager.arena(&id).is_some() {
            if let Some(w) = manager.arena(&id).and_then(|a| a.world().cloned()) {
                world = Some(w);
            }
            manager.tick();
            ticks += 1;
            assert!(ticks < 100, "arena never finished");
        }

        // 2 waiting + 3 starting + rounds in game + 2 ending
        assert_eq!(ticks, 2 + 3 + ROUNDS * SUBGAME_TICKS + 2);

        let world = world.unwrap();
        assert!(!world.path.exists());
        assert!(!manager.ids().contains(&id));

        let next = manager.arena_of("a").unwrap();
        assert_ne!(next.id(), id);
        assert!(next.has_player("b"));
        assert_eq!(next.phase(), ArenaPhase::Waiting);

        let events = drain_manager(&mut manager);
        assert!(events.contains(&ArenaEvent::Destroyed(id.clone())));
        assert!(events.iter().any(|e| matches!(
            e,
            ArenaEvent::PhaseChange { to: ArenaPhase::Ending, .. }
        )));
    }

    #[test]
    fn test_manager_requires_maps() {
        let h = harness_with_maps(config(), &[]);
        let mut manager = new_manager(&h);
        assert!(matches!(manager.create(), Err(ArenaError::NoMapsLoaded)));
        assert!(matches!(manager.join("a"), Err(ArenaError::NoMapsLoaded)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_manager_rejects_maps_short_of_minimum() {
        // The fixture map has four spawns
        let h = harness(ArenaConfig::new().min_players(5).max_players(8));
        match crate::manager::ArenaManager::new(h.ctx.clone()) {
            Err(ArenaError::InvalidMap { name, .. }) => assert_eq!(name, "classic"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("manager accepted a map without enough spawns"),
        }

        let h = harness(ArenaConfig::new().min_players(4).max_players(8));
        assert!(crate::manager::ArenaManager::new(h.ctx.clone()).is_ok());
    }

    #[test]
    fn test_manager_keeps_working_with_full_event_channel() {
        let mut config = config();
        config.event_buffer = 1;
        let h = harness(config);
        let mut manager = new_manager(&h);

        manager.create().unwrap();
        manager.create().unwrap();
        manager.join("a").unwrap();

        assert_eq!(manager.len(), 2);
        assert_eq!(drain_manager(&mut manager).len(), 1);
    }

    #[test]
    fn test_manager_create_with_unknown_map() {
        let h = harness(config());
        let mut manager = new_manager(&h);
        assert!(matches!(
            manager.create_with_map("missing"),
            Err(ArenaError::MapNotFound(_))
        ));
        assert!(manager.is_empty());

        let id = manager.create_with_map("classic").unwrap();
        assert!(manager.arena(&id).unwrap().votes().forced().is_some());
    }

    #[test]
    fn test_manager_join_fills_fullest_arena() {
        let h = harness(config());
        let mut manager = new_manager(&h);

        let empty = manager.create().unwrap();
        let first = manager.join("a").unwrap();
        assert_eq!(first, empty);
        manager.join("b").unwrap();

        let other = manager.create().unwrap();
        assert_eq!(manager.join("c").unwrap(), first);
        assert_eq!(manager.join("d").unwrap(), first);
        // first is full now
        assert_eq!(manager.join("e").unwrap(), other);

        assert!(matches!(manager.join("a"), Err(ArenaError::AlreadyInArena)));
        manager.leave("e").unwrap();
        assert!(matches!(manager.leave("e"), Err(ArenaError::NotInArena)));
    }

    #[test]
    fn test_manager_vote() {
        let h = harness(config());
        let mut manager = new_manager(&h);
        let id = manager.join("a").unwrap();

        manager.vote("a", "classic").unwrap();
        assert_eq!(manager.arena(&id).unwrap().votes().vote_of("a"), Some("classic"));
        assert!(matches!(manager.vote("zz", "classic"), Err(ArenaError::NotInArena)));
    }

    #[test]
    fn test_manager_destroy_releases_world() {
        let h = harness(config().waiting_time(1));
        let mut manager = new_manager(&h);
        let id = manager.join("a").unwrap();
        manager.join("b").unwrap();

        for _ in 0..5 {
            manager.tick();
        }
        let world = manager.arena(&id).unwrap().world().cloned().unwrap();

        manager.destroy(&id).unwrap();
        assert!(manager.arena(&id).is_none());
        assert!(!world.path.exists());
        assert_eq!(h.hooks.last_teleport("a").unwrap(), h.ctx.config.lobby);
        assert!(matches!(manager.destroy(&id), Err(ArenaError::ArenaNotFound(_))));
    }

    #[test]
    fn test_arenas_get_separate_worlds() {
        let h = harness(config().waiting_time(1));
        let mut manager = new_manager(&h);
        let first = manager.create().unwrap();
        let second = manager.create().unwrap();
        for (player, id) in [("a", &first), ("b", &first), ("c", &second), ("d", &second)] {
            manager.arena_mut(id).unwrap().add_player(player).unwrap();
        }

        for _ in 0..5 {
            manager.tick();
        }
        let w1 = manager.arena(&first).unwrap().world().cloned().unwrap();
        let w2 = manager.arena(&second).unwrap().world().cloned().unwrap();
        assert_ne!(w1.name, w2.name);

        manager.leave("c").unwrap();
        manager.tick();
        assert!(!w2.path.exists());
        assert!(w1.path.exists());
        assert_eq!(h.host.loaded(), vec![w1.name.clone()]);
    }

    #[test]
    fn test_snapshot_serialization() {
        let h = harness(config());
        let mut manager = new_manager(&h);
        let id = manager.join("a").unwrap();

        let snapshots = manager.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].arena_id, id);
        assert_eq!(snapshots[0].players, vec!["a".to_string()]);

        let json = serde_json::to_string(&snapshots[0]).unwrap();
        assert!(json.contains("\"phase\":\"waiting\""));
        assert!(json.contains("\"waiting_timer\":40"));
    }

    #[test]
    fn test_scheduler_drives_ticks() {
        tokio_test::block_on(async {
            let h = harness(config());
            let mut manager = new_manager(&h);
            let id = manager.join("a").unwrap();
            manager.join("b").unwrap();

            let shared = Arc::new(tokio::sync::Mutex::new(manager));
            let scheduler = ArenaScheduler::start(shared.clone(), Duration::from_millis(5));
            assert!(scheduler.is_running());

            tokio::time::sleep(Duration::from_millis(100)).await;
            scheduler.stop();

            let manager = shared.lock().await;
            assert!(manager.arena(&id).unwrap().waiting_timer() < 40);
        });
    }

    #[test]
    fn test_scheduler_ticks_off_the_runtime_thread() {
        tokio_test::block_on(async {
            let h = harness(config());
            let mut manager = new_manager(&h);
            manager.join("a").unwrap();

            let shared = Arc::new(tokio::sync::Mutex::new(manager));
            let scheduler = ArenaScheduler::start(shared.clone(), Duration::from_millis(5));
            tokio::time::sleep(Duration::from_millis(50)).await;
            scheduler.stop();

            let ticked_on = h.hooks.last_thread().expect("tick sent a notice");
            assert_ne!(ticked_on, std::thread::current().id());
        });
    }
}
