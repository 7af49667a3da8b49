use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RoadConfig {
    pub control_points: usize,
    pub radius: f32,
    pub segments: usize,
    pub width: f32,
    pub arc_divisions: usize,
}

impl Default for RoadConfig {
    fn default() -> Self {
        RoadConfig {
            control_points: 17,
            radius: 800.0,
            segments: 500,
            width: 30.0,
            arc_divisions: 200,
        }
    }
}

/// Closed centripetal Catmull-Rom curve through the road's control points,
/// plus a cached polyline for distance queries.
pub struct Road {
    points: Vec<Vector3<f32>>,
    polyline: Vec<Vector3<f32>>,
    arc_lengths: Vec<f32>,
    pub width: f32,
}

impl Road {
    pub fn generate(config: &RoadConfig) -> Self {
        let count = config.control_points.max(3);
        let points = (0..count)
            .map(|i| {
                let angle = i as f32 / (count - 1) as f32 * TAU;
                Vector3::new(
                    angle.cos() * config.radius + (angle * 3.0).sin() * 200.0,
                    0.0,
                    angle.sin() * config.radius + (angle * 2.5).cos() * 150.0,
                )
            })
            .collect();
        Self::from_points(points, config.segments, config.arc_divisions, config.width)
    }

    pub fn from_points(points: Vec<Vector3<f32>>, segments: usize, arc_divisions: usize, width: f32) -> Self {
        let mut road = Road { points, polyline: Vec::new(), arc_lengths: Vec::new(), width };
        let segments = segments.max(1);
        road.polyline = (0..=segments).map(|i| road.point(i as f32 / segments as f32)).collect();

        let divisions = arc_divisions.max(1);
        let mut total = 0.0;
        let mut last = road.point(0.0);
        road.arc_lengths.push(0.0);
        for i in 1..=divisions {
            let current = road.point(i as f32 / divisions as f32);
            total += (current - last).norm();
            road.arc_lengths.push(total);
            last = current;
        }
        log::info!(
            "road generated: {} control points, {} polyline points, length {:.0}",
            road.points.len(),
            road.polyline.len(),
            total
        );
        road
    }

    pub fn control_points(&self) -> &[Vector3<f32>] {
        &self.points
    }

    pub fn polyline(&self) -> &[Vector3<f32>] {
        &self.polyline
    }

    pub fn length(&self) -> f32 {
        self.arc_lengths.last().copied().unwrap_or(0.0)
    }

    /// Point at raw curve parameter `t`. Each control span covers an equal share of `t`.
    pub fn point(&self, t: f32) -> Vector3<f32> {
        let ([x, y, z], w) = self.segment(t);
        Vector3::new(x.eval(w), y.eval(w), z.eval(w))
    }

    /// Unit tangent at raw parameter `t`.
    pub fn tangent(&self, t: f32) -> Vector3<f32> {
        let ([x, y, z], w) = self.segment(t);
        let d = Vector3::new(x.slope(w), y.slope(w), z.slope(w));
        if d.norm_squared() > 1e-12 {
            return d.normalize();
        }
        let delta = 1e-4;
        let chord = self.point(wrap(t + delta)) - self.point(wrap(t - delta));
        if chord.norm_squared() > 1e-12 {
            chord.normalize()
        } else {
            Vector3::x()
        }
    }

    /// Point at arc-length fraction `u`, wrapping around the loop.
    pub fn point_at(&self, u: f32) -> Vector3<f32> {
        self.point(self.u_to_t(u))
    }

    pub fn tangent_at(&self, u: f32) -> Vector3<f32> {
        self.tangent(self.u_to_t(u))
    }

    /// Horizontal left-hand perpendicular `(-tz, 0, tx)` of the tangent at `u`.
    pub fn perpendicular_at(&self, u: f32) -> Vector3<f32> {
        let t = self.tangent_at(u);
        Vector3::new(-t.z, 0.0, t.x)
    }

    /// Perpendicular at a polyline vertex, using its neighbours for the direction.
    pub fn perpendicular_at_index(&self, index: usize) -> Vector3<f32> {
        let n = self.polyline.len();
        if n < 2 {
            return Vector3::x();
        }
        let index = index.min(n - 1);
        let prev = self.polyline[index.saturating_sub(1)];
        let next = self.polyline[(index + 1).min(n - 1)];
        let along = next - prev;
        let perp = Vector3::new(-along.z, 0.0, along.x);
        if perp.norm_squared() > 1e-12 {
            perp.normalize()
        } else {
            Vector3::x()
        }
    }

    /// Planar distance from `(x, z)` to the nearest polyline vertex.
    pub fn distance_to(&self, x: f32, z: f32) -> f32 {
        let target = Vector2::new(x, z);
        self.polyline
            .iter()
            .map(|p| (Vector2::new(p.x, p.z) - target).norm_squared())
            .fold(f32::INFINITY, f32::min)
            .sqrt()
    }

    pub fn is_on_road(&self, x: f32, z: f32, buffer: f32) -> bool {
        self.distance_to(x, z) < buffer
    }

    fn segment(&self, t: f32) -> ([Cubic; 3], f32) {
        let l = self.points.len() as i64;
        let p = l as f32 * t;
        let int_point = p.floor() as i64;
        let weight = p - int_point as f32;
        let at = |i: i64| self.points[i.rem_euclid(l) as usize];
        let (p0, p1, p2, p3) = (at(int_point - 1), at(int_point), at(int_point + 1), at(int_point + 2));

        let mut dt0 = (p1 - p0).norm_squared().powf(0.25);
        let mut dt1 = (p2 - p1).norm_squared().powf(0.25);
        let mut dt2 = (p3 - p2).norm_squared().powf(0.25);
        // Coincident points would divide by zero.
        if dt1 < 1e-4 {
            dt1 = 1.0;
        }
        if dt0 < 1e-4 {
            dt0 = dt1;
        }
        if dt2 < 1e-4 {
            dt2 = dt1;
        }
        let knots = [dt0, dt1, dt2];
        let cubics = [0, 1, 2].map(|axis| centripetal(p0[axis], p1[axis], p2[axis], p3[axis], &knots));
        (cubics, weight)
    }

    fn u_to_t(&self, u: f32) -> f32 {
        let u = wrap(u);
        let total = self.length();
        let n = self.arc_lengths.len();
        if total <= 0.0 || n < 2 {
            return u;
        }
        let target = u * total;
        let i = self.arc_lengths.partition_point(|&len| len < target).clamp(1, n - 1);
        let before = self.arc_lengths[i - 1];
        let segment = self.arc_lengths[i] - before;
        let fraction = if segment > 0.0 { (target - before) / segment } else { 0.0 };
        ((i - 1) as f32 + fraction) / (n - 1) as f32
    }
}

/// Maps any real onto [0, 1).
pub fn wrap(t: f32) -> f32 {
    let w = t.rem_euclid(1.0);
    if w >= 1.0 {
        0.0
    } else {
        w
    }
}

struct Cubic {
    c0: f32,
    c1: f32,
    c2: f32,
    c3: f32,
}

impl Cubic {
    fn eval(&self, w: f32) -> f32 {
        self.c0 + self.c1 * w + self.c2 * w * w + self.c3 * w * w * w
    }

    fn slope(&self, w: f32) -> f32 {
        self.c1 + 2.0 * self.c2 * w + 3.0 * self.c3 * w * w
    }
}

fn centripetal(x0: f32, x1: f32, x2: f32, x3: f32, knots: &[f32; 3]) -> Cubic {
    let [dt0, dt1, dt2] = *knots;
    let t1 = ((x1 - x0) / dt0 - (x2 - x0) / (dt0 + dt1) + (x2 - x1) / dt1) * dt1;
    let t2 = ((x2 - x1) / dt1 - (x3 - x1) / (dt1 + dt2) + (x3 - x2) / dt2) * dt1;
    Cubic {
        c0: x1,
        c1: t1,
        c2: -3.0 * x1 + 3.0 * x2 - 2.0 * t1 - t2,
        c3: 2.0 * x1 - 2.0 * x2 + t1 + t2,
    }
}
