use kine_core::FrameClock;
use kine_ecs::{Scheduler, World};
use kine_scene::SceneTree;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::context::{FrameTiming, Input, Running};
use crate::render::RenderList;

/// Owns the scene tree, the system scheduler and the frame clock, and runs
/// them in a fixed order every frame.
///
/// ```no_run
/// # use kine::{Engine, EngineConfig};
/// let mut engine = Engine::new(EngineConfig::default());
/// engine.init();
/// while engine.is_running() {
///     engine.begin_frame(1.0 / 60.0);
///     engine.update();
/// }
/// engine.shutdown();
/// ```
pub struct Engine {
    config: EngineConfig,
    clock: FrameClock,
    tree: SceneTree,
    scheduler: Scheduler,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let mut scheduler = Scheduler::new();
        scheduler.set_max_fixed_steps(config.scheduler.step_cap());

        Self {
            clock: FrameClock::new(config.time.clone()),
            tree: SceneTree::new(),
            scheduler,
            config,
        }
    }

    /// Install the context objects, finalize the scene tree and start running.
    /// A tree without a root stays unfinalized; call `tree_mut().finalize()`
    /// once the scene is built.
    pub fn init(&mut self) {
        let world = self.tree.world_mut();
        world.set_context(Running(true));
        world.set_context(Input::default());
        world.set_context(RenderList::default());
        world.set_context(FrameTiming {
            fixed_dt: self.clock.fixed_dt(),
            ..FrameTiming::default()
        });

        self.tree.finalize();
        info!(
            systems = self.scheduler.len(),
            fixed_dt = self.clock.fixed_dt(),
            "engine initialized"
        );
    }

    /// Advance the clock by the host-measured `raw_dt` and reset per-frame state.
    pub fn begin_frame(&mut self, raw_dt: f32) {
        self.clock.begin_frame(raw_dt);

        let timing = FrameTiming {
            dt: self.clock.delta_time,
            fixed_dt: self.clock.fixed_dt(),
            alpha: self.clock.alpha(),
            frame: self.clock.frame_count,
        };

        let world = self.tree.world_mut();
        if let Ok(input) = world.try_context_mut::<Input>() {
            input.begin_frame();
        }
        if let Ok(list) = world.try_context_mut::<RenderList>() {
            list.clear();
        }
        world.set_context(timing);
    }

    /// Run one frame: tree update, tree fixed update, scheduled systems,
    /// fixed-rate catch-up, then deferred node deletion.
    pub fn update(&mut self) {
        let dt = self.clock.delta_time;
        let fixed_dt = self.clock.fixed_dt();
        let alpha = self.clock.alpha();

        self.tree.update(dt);
        self.tree.fixed_update(fixed_dt);

        self.scheduler.update(self.tree.world_mut(), dt, alpha);
        let steps = self.scheduler.fixed_update(
            self.tree.world_mut(),
            self.clock.accumulator_mut(),
            fixed_dt,
            alpha,
        );

        let removed = self.tree.remove_queued_objs();
        debug!(frame = self.clock.frame_count, steps, removed, "frame complete");
    }

    /// Convenience for hosts that do not need to act between the two steps.
    pub fn run_frame(&mut self, raw_dt: f32) {
        self.begin_frame(raw_dt);
        self.update();
    }

    pub fn request_exit(&mut self) {
        if let Ok(running) = self.tree.world_mut().try_context_mut::<Running>() {
            running.0 = false;
        }
    }

    /// False before `init`, after `shutdown` or once an exit was requested.
    pub fn is_running(&self) -> bool {
        self.tree
            .world()
            .try_context::<Running>()
            .is_ok_and(|running| running.0)
    }

    /// Remove the context objects and drop all systems.
    pub fn shutdown(&mut self) {
        let world = self.tree.world_mut();
        world.remove_context::<Running>();
        world.remove_context::<Input>();
        world.remove_context::<RenderList>();
        world.remove_context::<FrameTiming>();
        self.scheduler.clear();
        info!(frames = self.clock.frame_count, "engine shut down");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    pub fn tree(&self) -> &SceneTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut SceneTree {
        &mut self.tree
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn world(&self) -> &World {
        self.tree.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.tree.world_mut()
    }

    pub fn input_mut(&mut self) -> &mut Input {
        self.tree.world_mut().context_mut::<Input>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kine_scene::{EmptyNode, Node, NodeContext};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder(Log);

    impl Node for Recorder {
        fn update(&mut self, _ctx: &mut NodeContext<'_>, _dt: f32) {
            self.0.lock().push("tree update".into());
        }

        fn fixed_update(&mut self, _ctx: &mut NodeContext<'_>, _dt: f32) {
            self.0.lock().push("tree fixed".into());
        }
    }

    struct QueueOnUpdate;

    impl Node for QueueOnUpdate {
        fn update(&mut self, ctx: &mut NodeContext<'_>, _dt: f32) {
            ctx.queue_free();
        }
    }

    fn engine_with_log() -> (Engine, Log) {
        let log = Log::default();
        let mut engine = Engine::new(EngineConfig::default());
        engine.tree_mut().create("root", Recorder(Arc::clone(&log)));

        let l = Arc::clone(&log);
        engine
            .scheduler_mut()
            .add_system("Variable", move |_: &mut World, _: f32, _: f32| l.lock().push("system".into()));
        (engine, log)
    }

    #[test]
    fn lifecycle_flags() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.tree_mut().create("root", EmptyNode);
        assert!(!engine.is_running());
        engine.init();
        assert!(engine.is_running());
        assert!(engine.tree().is_ready());

        engine.request_exit();
        assert!(!engine.is_running());

        engine.shutdown();
        assert!(!engine.world().has_context::<Input>());
        assert!(engine.scheduler().is_empty());
    }

    #[test]
    fn scene_built_after_init_is_finalized_later() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.init();
        assert!(engine.is_running());
        assert!(!engine.tree().is_ready());

        let root = engine.tree_mut().create("root", EmptyNode);
        engine.tree_mut().add_child(root, "child", EmptyNode).unwrap();
        assert_eq!(engine.world().entity_count(), 0);

        engine.tree_mut().finalize();
        assert!(engine.tree().is_ready());
        assert_eq!(engine.world().entity_count(), 2);
    }

    #[test]
    fn frame_order() {
        let (mut engine, log) = engine_with_log();
        engine.init();

        // Half a fixed step: no catch-up step yet.
        engine.run_frame(1.0 / 120.0);
        assert_eq!(*log.lock(), ["tree update", "tree fixed", "system"]);
        log.lock().clear();

        // Crosses one fixed step: the system also runs once at the fixed rate.
        engine.run_frame(1.0 / 120.0);
        assert_eq!(*log.lock(), ["tree update", "tree fixed", "system", "system"]);
    }

    #[test]
    fn frame_timing_context_tracks_clock() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.init();
        engine.run_frame(0.01);

        let timing = *engine.world().context::<FrameTiming>();
        assert_eq!(timing.dt, 0.01);
        assert_eq!(timing.frame, 1);
        assert_eq!(timing.fixed_dt, 1.0 / 60.0);
        assert!(timing.alpha > 0.5 && timing.alpha < 0.7);
    }

    #[test]
    fn render_list_is_cleared_each_frame() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.scheduler_mut().add_system("Draw", |world: &mut World, _: f32, _: f32| {
            world
                .context_mut::<RenderList>()
                .draw_rect(glam::Vec2::ZERO, glam::Vec2::ONE, kine_core::Color::WHITE);
        });
        engine.init();

        engine.run_frame(0.001);
        assert_eq!(engine.world().context::<RenderList>().len(), 1);
        engine.run_frame(0.001);
        assert_eq!(engine.world().context::<RenderList>().len(), 1);
    }

    #[test]
    fn queued_nodes_removed_at_end_of_frame() {
        let mut engine = Engine::new(EngineConfig::default());
        let root = engine.tree_mut().create("root", kine_scene::EmptyNode);
        let doomed = engine.tree_mut().add_child(root, "doomed", QueueOnUpdate).unwrap();
        engine.init();
        assert_eq!(engine.world().entity_count(), 2);

        engine.run_frame(0.016);
        assert!(engine.tree().node(doomed).is_none());
        assert_eq!(engine.world().entity_count(), 1);
    }

    #[test]
    fn step_cap_comes_from_config() {
        let mut config = EngineConfig::default();
        config.scheduler.max_fixed_steps = 2;
        config.time.max_delta_time = 1.0;
        let count = Arc::new(Mutex::new(0u32));

        let mut engine = Engine::new(config);
        let c = Arc::clone(&count);
        engine
            .scheduler_mut()
            .add_system("Count", move |_: &mut World, _: f32, _: f32| *c.lock() += 1);
        engine.init();

        // One variable run plus two capped fixed steps.
        engine.run_frame(0.5);
        assert_eq!(*count.lock(), 3);
        assert!(engine.clock().accumulator() < engine.clock().fixed_dt());
    }

    #[test]
    fn input_edges_roll_with_frames() {
        use crate::context::Key;

        let mut engine = Engine::new(EngineConfig::default());
        engine.init();
        engine.begin_frame(0.016);
        engine.input_mut().set_key_state(Key::SPACE, true);
        assert!(engine.world().context::<Input>().key_pressed(Key::SPACE));

        engine.begin_frame(0.016);
        assert!(!engine.world().context::<Input>().key_pressed(Key::SPACE));
        assert!(engine.world().context::<Input>().key_down(Key::SPACE));
    }
}
