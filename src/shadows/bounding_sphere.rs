// src/shadows/bounding_sphere.rs
// Exact minimum enclosing ball of a small point set (Welzl), evaluated in f64

use glam::{DMat3, DVec3, Vec3};

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn contains(&self, p: Vec3, tolerance: f32) -> bool {
        p.distance(self.center) <= self.radius + tolerance
    }
}

#[derive(Debug, Clone, Copy)]
struct Ball {
    center: DVec3,
    radius: f64,
}

impl Ball {
    const EMPTY: Ball = Ball {
        center: DVec3::ZERO,
        radius: -1.0,
    };

    fn contains(&self, p: DVec3) -> bool {
        self.radius >= 0.0 && p.distance(self.center) <= self.radius + EPS * (1.0 + self.radius)
    }

    fn contains_all(&self, points: &[DVec3]) -> bool {
        points.iter().all(|p| self.contains(*p))
    }
}

fn ball_from_two(a: DVec3, b: DVec3) -> Ball {
    let center = (a + b) * 0.5;
    Ball {
        center,
        radius: a.distance(center),
    }
}

/// Circumcircle of a triangle; falls back to the widest pair when collinear
fn ball_from_three(a: DVec3, b: DVec3, c: DVec3) -> Ball {
    let ab = b - a;
    let ac = c - a;
    let n = ab.cross(ac);
    let denom = 2.0 * n.length_squared();
    if denom <= EPS * EPS {
        return [ball_from_two(a, b), ball_from_two(a, c), ball_from_two(b, c)]
            .into_iter()
            .fold(Ball::EMPTY, |best, ball| if ball.radius > best.radius { ball } else { best });
    }
    let offset = (n.cross(ab) * ac.length_squared() + ac.cross(n) * ab.length_squared()) / denom;
    Ball {
        center: a + offset,
        radius: offset.length(),
    }
}

/// Circumsphere of a tetrahedron; coplanar sets use the smallest enclosing
/// triangle ball instead
fn ball_from_four(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> Ball {
    let (ab, ac, ad) = (b - a, c - a, d - a);
    let m = DMat3::from_cols(ab, ac, ad).transpose();
    let det = m.determinant();
    if det.abs() > EPS {
        let rhs = DVec3::new(ab.length_squared(), ac.length_squared(), ad.length_squared()) * 0.5;
        let offset = m.inverse() * rhs;
        return Ball {
            center: a + offset,
            radius: offset.length(),
        };
    }
    let all = [a, b, c, d];
    let candidates = [
        ball_from_three(a, b, c),
        ball_from_three(a, b, d),
        ball_from_three(a, c, d),
        ball_from_three(b, c, d),
    ];
    candidates
        .iter()
        .filter(|ball| ball.contains_all(&all))
        .fold(None, |best: Option<Ball>, ball| match best {
            Some(b) if b.radius <= ball.radius => Some(b),
            _ => Some(*ball),
        })
        .unwrap_or_else(|| {
            candidates
                .into_iter()
                .fold(Ball::EMPTY, |best, ball| if ball.radius > best.radius { ball } else { best })
        })
}

fn trivial(boundary: &[DVec3]) -> Ball {
    match *boundary {
        [] => Ball::EMPTY,
        [a] => Ball {
            center: a,
            radius: 0.0,
        },
        [a, b] => ball_from_two(a, b),
        [a, b, c] => ball_from_three(a, b, c),
        [a, b, c, d, ..] => ball_from_four(a, b, c, d),
    }
}

fn welzl(points: &[DVec3], boundary: &mut Vec<DVec3>) -> Ball {
    let Some((&p, rest)) = points.split_last() else {
        return trivial(boundary);
    };
    if boundary.len() == 4 {
        return trivial(boundary);
    }
    let ball = welzl(rest, boundary);
    if ball.contains(p) {
        return ball;
    }
    boundary.push(p);
    let ball = welzl(rest, boundary);
    boundary.pop();
    ball
}

/// Smallest sphere enclosing every point.
///
/// The radius is finally widened to the farthest point so containment holds
/// after the f32 conversion.
pub fn minimum_bounding_sphere(points: &[Vec3]) -> BoundingSphere {
    if points.is_empty() {
        return BoundingSphere {
            center: Vec3::ZERO,
            radius: 0.0,
        };
    }
    let pts: Vec<DVec3> = points.iter().map(|p| p.as_dvec3()).collect();
    let ball = welzl(&pts, &mut Vec::with_capacity(4));
    let center = ball.center.as_vec3();
    let radius = points
        .iter()
        .map(|p| p.distance(center))
        .fold(ball.radius.max(0.0) as f32, f32::max);
    BoundingSphere { center, radius }
}
