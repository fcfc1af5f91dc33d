use glam::{Quat, Vec3};

use tickwire::{HostSession, ObjectId, SessionError, Transform};

const ORBIT_RADIUS: f32 = 5.0;
const ANGULAR_SPEED: f32 = 0.5;

/// Spawns `count` objects, each with a `Transform` at its starting point on the orbit.
pub fn spawn_objects(session: &mut HostSession, count: usize) -> Result<Vec<ObjectId>, SessionError> {
    let mut ids = Vec::with_capacity(count);
    for slot in 0..count {
        let id = session.create_object()?;
        session.set_component(id, &orbit(slot, count, 0.0))?;
        ids.push(id);
    }
    Ok(ids)
}

/// Moves every object along the orbit to where it is at `elapsed` seconds.
pub fn animate(session: &mut HostSession, ids: &[ObjectId], elapsed: f32) -> Result<(), SessionError> {
    for (slot, &id) in ids.iter().enumerate() {
        session.set_component(id, &orbit(slot, ids.len(), elapsed))?;
    }
    Ok(())
}

fn orbit(slot: usize, count: usize, elapsed: f32) -> Transform {
    let phase = slot as f32 / count.max(1) as f32 * std::f32::consts::TAU;
    let angle = phase + elapsed * ANGULAR_SPEED;
    let (sin, cos) = angle.sin_cos();
    Transform {
        position: Vec3::new(cos * ORBIT_RADIUS, 1.0, sin * ORBIT_RADIUS),
        rotation: Quat::from_rotation_y(-angle),
    }
}
