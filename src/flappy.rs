//! Headless flappy-bird scene used by the demo binary

use anyhow::Result;
use kine::{
    vec2, Color, DemoConfig, EmptyNode, Engine, Entity, Input, Key, Node, NodeContext, NodeId,
    RenderList, Vec2, World,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

pub const SCREEN_WIDTH: f32 = 800.0;
pub const SCREEN_HEIGHT: f32 = 600.0;

const PIPE_SPACING: f32 = 500.0;
const PIPE_COUNT: usize = 4;
const PIPE_SPEED: f32 = 200.0;

const GRAVITY: f32 = 900.0;
const FLAP_VELOCITY: f32 = -350.0;
const GROUND_Y: f32 = 520.0;
const BIRD_START: Vec2 = Vec2::new(200.0, 200.0);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub pos: Vec2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    pub vel: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    pub size: Vec2,
    pub color: Color,
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            size: Vec2::splat(32.0),
            color: Color::YELLOW,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Collider {
    pub size: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipeConfig {
    pub speed: f32,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self { speed: PIPE_SPEED }
    }
}

/// Marks the bird's entity
#[derive(Debug, Clone, Copy, Default)]
pub struct Player;

/// Collision bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GameState {
    pub crashed: bool,
    pub crashes: u32,
}

/// Random source shared by the pipes
pub struct PipeRng(pub StdRng);

fn random_center(world: &mut World) -> f32 {
    world.context_mut::<PipeRng>().0.gen_range(150.0..450.0)
}

pub struct Bird;

impl Node for Bird {
    fn on_attach(&mut self, ctx: &mut NodeContext<'_>) {
        ctx.require::<(Velocity, Sprite, Player)>();
        ctx.add(Transform { pos: BIRD_START });
        let size = ctx.get::<Sprite>().size;
        ctx.add(Collider { size });
    }

    fn update(&mut self, ctx: &mut NodeContext<'_>, _dt: f32) {
        if ctx.world().context::<Input>().key_pressed(Key::SPACE) {
            ctx.get_mut::<Velocity>().vel.y = FLAP_VELOCITY;
        }
    }

    fn fixed_update(&mut self, ctx: &mut NodeContext<'_>, dt: f32) {
        let vel = {
            let velocity = ctx.get_mut::<Velocity>();
            velocity.vel.y += GRAVITY * dt;
            velocity.vel
        };
        ctx.get_mut::<Transform>().pos += vel * dt;
    }
}

/// A pair of pipe segments with a gap between them. The segments are
/// entities of their own; the node's entity only anchors the node.
pub struct Pipe {
    pub spawn_x: f32,
    pub center_y: f32,
    pub gap: f32,
    pub width: f32,
    segments: Option<(Entity, Entity)>,
}

impl Pipe {
    pub fn new(pos: Vec2) -> Self {
        Self {
            spawn_x: pos.x,
            center_y: pos.y,
            gap: 160.0,
            width: 60.0,
            segments: None,
        }
    }

    pub fn segments(&self) -> Option<(Entity, Entity)> {
        self.segments
    }

    /// Place both segments around `center_y` at `spawn_x`.
    pub fn reset(&mut self, world: &mut World) {
        let Some((top, bottom)) = self.segments else {
            return;
        };

        let half_gap = self.gap * 0.5;
        self.center_y = self
            .center_y
            .clamp(half_gap + 20.0, SCREEN_HEIGHT - half_gap - 20.0);
        let gap_top = self.center_y - half_gap;
        let gap_bottom = self.center_y + half_gap;

        for (entity, pos, size) in [
            (top, vec2(self.spawn_x, 0.0), vec2(self.width, gap_top)),
            (bottom, vec2(self.spawn_x, gap_bottom), vec2(self.width, SCREEN_HEIGHT - gap_bottom)),
        ] {
            world.get_mut::<Transform>(entity).pos = pos;
            *world.get_mut::<Sprite>(entity) = Sprite {
                size,
                color: Color::GREEN,
            };
            world.get_mut::<Collider>(entity).size = size;
            world.get_mut::<PipeConfig>(entity).speed = PIPE_SPEED;
        }
    }
}

impl Node for Pipe {
    fn on_attach(&mut self, ctx: &mut NodeContext<'_>) {
        let world = ctx.world_mut();
        let mut segment = || {
            let entity = world.create();
            world.require::<(Transform, Sprite, Collider, PipeConfig)>(entity);
            entity
        };
        let top = segment();
        let bottom = segment();
        self.segments = Some((top, bottom));
        self.reset(world);
    }

    fn on_detach(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some((top, bottom)) = self.segments.take() {
            ctx.world_mut().destroy(top);
            ctx.world_mut().destroy(bottom);
        }
    }

    fn fixed_update(&mut self, ctx: &mut NodeContext<'_>, _dt: f32) {
        let Some((top, _)) = self.segments else {
            return;
        };

        let x = ctx.world().get::<Transform>(top).pos.x;
        if x + self.width < 0.0 {
            self.spawn_x = x + PIPE_COUNT as f32 * PIPE_SPACING;
            self.center_y = random_center(ctx.world_mut());
            self.reset(ctx.world_mut());
        }
    }
}

/// Keeps moving bodies inside the play field.
pub fn physics_system(world: &mut World, _dt: f32, _alpha: f32) {
    for (_, (transform, velocity)) in world.query_mut::<(&mut Transform, &mut Velocity)>() {
        if transform.pos.y > GROUND_Y {
            transform.pos.y = GROUND_Y;
            velocity.vel.y = 0.0;
        }
        if transform.pos.y < 0.0 {
            transform.pos.y = 0.0;
            velocity.vel.y = velocity.vel.y.max(0.0);
        }
    }
}

pub fn pipe_scroll_system(world: &mut World, dt: f32, _alpha: f32) {
    for (_, (transform, config)) in world.query_mut::<(&mut Transform, &PipeConfig)>() {
        transform.pos.x -= config.speed * dt;
    }
}

/// Rebuilds the draw list from every visible sprite.
pub fn render_system(world: &mut World, _dt: f32, _alpha: f32) {
    let rects: Vec<(Vec2, Vec2, Color)> = world
        .query::<(&Transform, &Sprite)>()
        .map(|(_, (t, s))| (t.pos, s.size, s.color))
        .collect();

    let list = world.context_mut::<RenderList>();
    list.clear();
    for (pos, size, color) in rects {
        list.draw_rect(pos, size, color);
    }
}

fn aabb(p1: Vec2, s1: Vec2, p2: Vec2, s2: Vec2) -> bool {
    p1.x < p2.x + s2.x && p1.x + s1.x > p2.x && p1.y < p2.y + s2.y && p1.y + s1.y > p2.y
}

pub fn collision_system(world: &mut World, _dt: f32, _alpha: f32) {
    let birds: Vec<(Vec2, Vec2)> = world
        .query::<(&Transform, &Collider, &Player)>()
        .map(|(_, (t, c, _))| (t.pos, c.size))
        .collect();

    let hit = birds.iter().any(|&(bird_pos, bird_size)| {
        world
            .query::<(&Transform, &Collider, &PipeConfig)>()
            .any(|(_, (t, c, _))| aabb(bird_pos, bird_size, t.pos, c.size))
    });

    let state = world.context_mut::<GameState>();
    if hit && !state.crashed {
        state.crashes += 1;
        info!(crashes = state.crashes, "bird hit a pipe");
    }
    state.crashed = hit;
}

/// Node ids of the demo scene
pub struct FlappyScene {
    pub root: NodeId,
    pub bird: NodeId,
    pub pipes: Vec<NodeId>,
}

fn pipe_start_x(slot: usize) -> f32 {
    SCREEN_WIDTH + slot as f32 * PIPE_SPACING
}

/// Build the scene and register the systems. Call before `Engine::init`.
pub fn build(engine: &mut Engine, demo: &DemoConfig) -> Result<FlappyScene> {
    let mut rng = StdRng::seed_from_u64(demo.seed);

    let tree = engine.tree_mut();
    let root = tree.create("root", EmptyNode);
    let bird = tree.add_child(root, "Bird", Bird)?;

    let mut pipes = Vec::with_capacity(PIPE_COUNT);
    for i in 0..PIPE_COUNT {
        let y = rng.gen_range(150.0..450.0);
        let pipe = Pipe::new(vec2(pipe_start_x(i), y));
        pipes.push(tree.add_child(root, format!("Pipe {i}"), pipe)?);
    }

    let world = engine.world_mut();
    world.set_context(PipeRng(rng));
    world.set_context(GameState::default());

    let scheduler = engine.scheduler_mut();
    scheduler.add_system("Physics", physics_system);
    scheduler.add_system("Render", render_system);
    scheduler.add_system("PipeScroll", pipe_scroll_system);
    scheduler.add_system("Collision", collision_system);

    scheduler.add_dependency("Physics", "PipeScroll")?;
    scheduler.add_dependency("PipeScroll", "Render")?;
    scheduler.add_dependency("Physics", "Render")?;
    scheduler.add_dependency("PipeScroll", "Collision")?;

    Ok(FlappyScene { root, bird, pipes })
}

/// Put the bird back at its start and respawn every pipe.
pub fn reset(engine: &mut Engine, scene: &FlappyScene) {
    let (graph, world) = engine.tree_mut().parts_mut();

    if let Some(entity) = graph.node(scene.bird).and_then(|n| n.entity()) {
        world.get_mut::<Transform>(entity).pos = BIRD_START;
        world.get_mut::<Velocity>(entity).vel = Vec2::ZERO;
    }

    for (i, &id) in scene.pipes.iter().enumerate() {
        let center = random_center(world);
        if let Some(pipe) = graph.get_mut::<Pipe>(id) {
            pipe.spawn_x = pipe_start_x(i);
            pipe.center_y = center;
            pipe.reset(world);
        }
    }

    world.context_mut::<GameState>().crashed = false;
}
