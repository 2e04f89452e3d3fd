//! Kine demo - runs the flappy-bird scene headless and logs what happened.

mod flappy;

use anyhow::{Context, Result};
use kine::{Engine, EngineConfig, Key, RenderList};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    info!("Starting Kine demo...");

    let config = EngineConfig::load();
    let demo = config.demo.clone();

    let mut engine = Engine::new(config);
    let scene = flappy::build(&mut engine, &demo)?;
    engine.init();

    engine
        .scheduler_mut()
        .rebuild_order()
        .context("Failed to order systems")?;
    info!(
        order = ?engine.scheduler().order(),
        nodes = engine.tree().graph().subtree(scene.root).len(),
        "Scene ready"
    );

    let mut resets = 0;
    for frame in 0..demo.frames {
        if !engine.is_running() {
            break;
        }

        engine.begin_frame(demo.frame_dt);
        let flap = demo.flap_interval > 0 && frame % demo.flap_interval == 0;
        engine.input_mut().set_key_state(Key::SPACE, flap);
        engine.update();

        if engine.world().context::<flappy::GameState>().crashed {
            flappy::reset(&mut engine, &scene);
            resets += 1;
        }
    }

    let bird = engine
        .tree()
        .node(scene.bird)
        .and_then(|node| node.entity())
        .context("Bird node has no entity")?;
    let bird_pos = engine.world().get::<flappy::Transform>(bird).pos;
    let pipes_on_screen = scene
        .pipes
        .iter()
        .filter_map(|&id| engine.tree().get::<flappy::Pipe>(id)?.segments())
        .filter(|&(top, _)| {
            let x = engine.world().get::<flappy::Transform>(top).pos.x;
            (0.0..flappy::SCREEN_WIDTH).contains(&x)
        })
        .count();
    info!(
        frames = engine.clock().frame_count,
        simulated_seconds = engine.clock().total_time,
        resets,
        pipes_on_screen,
        draw_commands = engine.world().context::<RenderList>().len(),
        "Demo finished with bird at ({:.1}, {:.1})",
        bird_pos.x,
        bird_pos.y
    );

    engine.shutdown();
    Ok(())
}
