//! # Context Lifecycle Tests
//!
//! Drives a full context through start, ticks, collection and teardown the
//! way the engine does, checking what the renderer gets to see.

#![allow(missing_docs)]

use std::sync::Arc;

use neko_core::{EntityId, FrameDrain};
use neko_scripting::objects::{DynamicMesh, MeshData, Text};
use neko_scripting::{
    ContextState, FnScript, ReclaimPolicy, Registry, ScriptException, ScriptValue, ScriptingConfig,
    ScriptingContext, ScriptingError,
};
use neko_shared::{Transform, Vec2, Vec3, TICK_DELTA};

fn manual_gc() -> ScriptingConfig {
    ScriptingConfig {
        gc_interval_ticks: 0,
        ..ScriptingConfig::default()
    }
}

#[test]
fn test_retained_mesh_survives_unretained_text_does_not() {
    let mut kept: Option<ScriptValue> = None;
    let spawner = FnScript::new("spawner", move |scope, time| {
        match time.tick {
            1 => {
                let dims = scope.construct("vec2", &[1.0.into(), 1.0.into()])?;
                let segs = scope.construct("vec2", &[1.0.into(), 1.0.into()])?;
                let up = scope.construct("vec3", &[0.0.into(), 1.0.into(), 0.0.into()])?;
                let mesh = scope.construct("mesh", &["plane".into(), dims, segs, up])?;
                scope.retain(&mesh)?;
                kept = Some(mesh);
                scope.construct("text", &["temporary".into()])?;
            }
            3 => {
                let mesh = kept.take().ok_or_else(|| ScriptException::error("lost the mesh"))?;
                scope.release(&mesh)?;
            }
            _ => {}
        }
        Ok(())
    });

    let mut ctx = ScriptingContext::builder()
        .config(manual_gc())
        .script(spawner)
        .start()
        .unwrap();
    let mut meshes = FrameDrain::new(ctx.render_sync().meshes().clone());
    let mut texts = FrameDrain::new(ctx.render_sync().texts().clone());

    // tick 1: both objects announced
    let report = ctx.tick(0.0, TICK_DELTA).unwrap();
    assert!(report.errors.is_empty());
    assert_eq!(report.events_flushed, 2);
    let frame = meshes.drain();
    assert_eq!(frame.created.len(), 1);
    assert_eq!(frame.created[0].read(DynamicMesh::vertex_count).unwrap(), 4);
    let mesh = frame.created[0].clone();
    let text = texts.drain().created[0].clone();

    // collection between ticks: only the unretained text goes
    assert_eq!(ctx.collect_garbage(), 4); // text + two vec2 + vec3
    assert!(!mesh.is_deleted());
    assert!(text.is_deleted());

    // tick 2 flushes the destruction, exactly once
    ctx.tick(TICK_DELTA, TICK_DELTA).unwrap();
    let frame = texts.drain();
    assert_eq!(frame.destroyed.len(), 1);
    assert!(Arc::ptr_eq(&frame.destroyed[0], &text));
    assert!(meshes.drain().is_empty());
    assert!(texts.drain().is_empty());

    // tick 3 releases the mesh; the next collection takes it
    ctx.tick(2.0 * TICK_DELTA, TICK_DELTA).unwrap();
    assert!(!mesh.is_deleted());
    assert_eq!(ctx.collect_garbage(), 1);
    assert!(mesh.is_deleted());
    assert!(mesh.read(DynamicMesh::vertex_count).is_err());
    ctx.tick(3.0 * TICK_DELTA, TICK_DELTA).unwrap();
    assert_eq!(meshes.drain().destroyed.len(), 1);
}

#[test]
fn test_native_mesh_handed_over_by_move() {
    let mut ctx = ScriptingContext::builder().config(manual_gc()).start().unwrap();
    let mut owner = MeshData::plane(Vec2::new(4.0, 4.0), (4, 4), Vec3::Y);

    let handle = ctx
        .registries_mut()
        .mesh
        .create_from(std::mem::take(&mut owner))
        .unwrap();

    assert!(owner.is_empty());
    assert_eq!(handle.read(DynamicMesh::vertex_count).unwrap(), 25);
    assert_eq!(handle.read(DynamicMesh::index_count).unwrap(), 96);

    // exposing it to script gives the same object back
    let value = ScriptValue::from_handle(&handle);
    let count = ctx.with_scope(|scope| scope.get(&value, "vertexCount")).unwrap().unwrap();
    assert_eq!(count, ScriptValue::Number(25.0));
}

#[test]
fn test_script_moves_entity_transform() {
    let entity = EntityId::new(10, 1);
    let mover = FnScript::new("mover", move |scope, time| {
        let t = scope.construct("transform", &[(entity.to_bits() as f64).into()])?;
        let translate = scope.get(&t, "translate")?;
        scope.set(&translate, "x", &(time.tick as f64).into())?;
        Ok(())
    });

    let mut ctx = ScriptingContext::builder()
        .config(ScriptingConfig::deterministic())
        .script(mover)
        .start()
        .unwrap();
    let component = ctx
        .registries_mut()
        .transform_component(entity, Transform::IDENTITY)
        .unwrap();
    component.add_ref().unwrap();

    let mut applied = Vec::new();
    for tick in 0..3 {
        ctx.tick(f64::from(tick) * TICK_DELTA, TICK_DELTA).unwrap();
        ctx.sync_transforms(&mut |e: EntityId, t: Transform| applied.push((e, t.translate.x)));
    }

    assert_eq!(applied, vec![(entity, 1.0), (entity, 2.0), (entity, 3.0)]);
    assert_eq!(ctx.registries().transforms.len(), 1);
}

#[test]
fn test_immediate_policy_reclaims_on_release() {
    let config = ScriptingConfig {
        reclaim_policy: ReclaimPolicy::Immediate,
        gc_interval_ticks: 0,
        ..ScriptingConfig::default()
    };
    let mut ctx = ScriptingContext::builder().config(config).start().unwrap();
    let mut texts = FrameDrain::new(ctx.render_sync().texts().clone());

    let value = ctx
        .with_scope(|scope| -> Result<ScriptValue, ScriptException> {
            let v = scope.construct("text", &["short lived".into()])?;
            scope.retain(&v)?;
            scope.release(&v)?;
            Ok(v)
        })
        .unwrap()
        .unwrap();

    let err = ctx.with_scope(|scope| scope.get(&value, "content")).unwrap().unwrap_err();
    assert_eq!(err.kind, neko_scripting::ExceptionKind::ReferenceError);

    // purged at the end of the next tick, both events in one frame
    let report = ctx.tick(0.0, TICK_DELTA).unwrap();
    assert_eq!(report.events_flushed, 2);
    let frame = texts.drain();
    assert_eq!(frame.created.len(), 1);
    assert_eq!(frame.destroyed.len(), 1);
    assert!(Arc::ptr_eq(&frame.created[0], &frame.destroyed[0]));
}

#[test]
fn test_teardown_then_drop() {
    let mut ctx = ScriptingContext::builder().config(manual_gc()).start().unwrap();
    let text = ctx.registries_mut().text.create(Text::new("bye")).unwrap();
    text.add_ref().unwrap();

    ctx.teardown();
    assert_eq!(ctx.state(), ContextState::Disposed);
    assert!(text.is_deleted());
    assert!(matches!(
        text.add_ref(),
        Err(ScriptingError::DanglingReference { operation: "add_ref", .. })
    ));
    assert!(matches!(
        ctx.tick(0.0, TICK_DELTA),
        Err(ScriptingError::InvalidState { found: ContextState::Disposed, .. })
    ));
    assert!(ctx.registries().text.is_empty());
    drop(ctx);
}

#[test]
fn test_config_from_toml() {
    let config = ScriptingConfig::from_toml_str(
        "gc_interval_ticks = 30\nreclaim_policy = \"immediate\"\nmax_consecutive_failures = 5\n",
    )
    .unwrap();
    let ctx = ScriptingContext::builder().config(config).start().unwrap();
    assert_eq!(ctx.config().gc_interval_ticks, 30);
    assert_eq!(ctx.heap().policy(), ReclaimPolicy::Immediate);
}
