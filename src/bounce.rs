//! Keeps a rectangle moving inside the viewport, reflecting off its edges.

use cgmath::Vector2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounce {
    /// Pixels per frame.
    pub velocity: Vector2<f32>,
}

impl Bounce {
    pub fn new(velocity: Vector2<f32>) -> Self {
        Self { velocity }
    }

    /// Move `position` by one frame and bounce off the viewport edges.
    ///
    /// After a step the rectangle lies inside `[0, viewport - size]` on every
    /// axis where it fits; the overshoot past an edge is dropped. On an axis
    /// where it does not fit it is pinned to `viewport - size`. Either way the
    /// velocity flips at most once per axis and step.
    pub fn step(&mut self, position: &mut Vector2<f32>, size: Vector2<f32>, viewport: Vector2<f32>) {
        *position += self.velocity;
        bounce_axis(&mut position.x, &mut self.velocity.x, size.x, viewport.x);
        bounce_axis(&mut position.y, &mut self.velocity.y, size.y, viewport.y);
    }
}

impl Default for Bounce {
    fn default() -> Self {
        Self::new(Vector2::new(1.0, 2.0))
    }
}

fn bounce_axis(position: &mut f32, velocity: &mut f32, size: f32, max: f32) {
    if size > max {
        *position = max - size;
        *velocity = -*velocity;
    } else if *position < 0.0 {
        *position = 0.0;
        *velocity = -*velocity;
    } else if *position + size > max {
        *position = max - size;
        *velocity = -*velocity;
    }
}
