//! Ray geometry for hitscan resolution
//!
//! Pure functions only: validators in different rooms call into this
//! concurrently, so nothing here may hold scratch state between calls.

/// Intersect the finite segment `origin + t * dir, t in [0, 1]` with an
/// axis-aligned box using the slab method.
///
/// Returns the entry parameter `t` clamped to `[0, 1]`, or `f32::INFINITY`
/// when the segment misses the box. An origin inside the box yields `0.0`.
pub fn ray_segment_vs_aabb(
    origin_x: f32,
    origin_y: f32,
    dir_x: f32,
    dir_y: f32,
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
) -> f32 {
    let mut t0: f32 = 0.0;
    let mut t1: f32 = 1.0;

    for (origin, dir, min, max) in [
        (origin_x, dir_x, min_x, max_x),
        (origin_y, dir_y, min_y, max_y),
    ] {
        if dir.abs() < f32::EPSILON {
            // Parallel to this slab: reject unless the origin lies inside it
            if origin < min || origin > max {
                return f32::INFINITY;
            }
            continue;
        }

        let inv = 1.0 / dir;
        let mut near = (min - origin) * inv;
        let mut far = (max - origin) * inv;
        if near > far {
            std::mem::swap(&mut near, &mut far);
        }

        t0 = t0.max(near);
        t1 = t1.min(far);
        if t0 > t1 {
            return f32::INFINITY;
        }
    }

    t0.max(0.0)
}
