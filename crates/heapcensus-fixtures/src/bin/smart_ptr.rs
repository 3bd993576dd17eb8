//! Objects owned through `Arc`, `Box` and `Rc`.

use std::rc::Rc;
use std::sync::Arc;

use heapcensus_core::{Result, protocol};
use heapcensus_fixtures::objects::smart::{
    Bullet, Effect, Player, boxed_bullets, boxed_key, shared_effects, shared_key, shared_players,
};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{BULLETS, EFFECTS, PLAYERS};

fn main() -> Result<()> {
    run_fixture("smart_ptr", |run| {
        run.phase("Allocating Arc<Player>")?;
        let started = std::time::Instant::now();
        let players = shared_players(PLAYERS);
        let key = shared_key::<Player>();
        run.retained()
            .publish(key.clone(), players.iter().map(|p| Arc::as_ptr(p) as usize).collect());
        run.record_class(&key, started)?;

        run.phase("Allocating Box<Bullet>")?;
        let started = std::time::Instant::now();
        let bullets = boxed_bullets(BULLETS);
        let key = boxed_key::<Bullet>();
        run.retained().publish(
            key.clone(),
            bullets.iter().map(|b| std::ptr::from_ref::<Bullet>(b) as usize).collect(),
        );
        run.record_class(&key, started)?;

        run.phase("Allocating Rc<Effect>")?;
        let started = std::time::Instant::now();
        let (effects, extra) = shared_effects(EFFECTS);
        let key = shared_key::<Effect>();
        run.retained()
            .publish(key.clone(), effects.iter().map(|e| Rc::as_ptr(e) as usize).collect());
        run.record_class(&key, started)?;
        protocol::emit(&format!("  Effects with two owners: {}\n", extra.len()))?;

        Ok((players, bullets, effects, extra))
    })
}
