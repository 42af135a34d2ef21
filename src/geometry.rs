//! World-space geometry for nodes, ports and boundaries.
//!
//! Port offsets are stored relative to the node center. To locate a port on
//! the canvas we build the node's affine transform and map the offset through
//! it, optionally composed with a parent (group) transform supplied by the
//! rendering layer. Rotation and scale are never set by the engine itself but
//! flow through unchanged when a parent transform carries them.
//!
//! Resolution fails soft: a port with a non-finite offset, or an index that
//! does not exist, resolves to the origin. Callers that care should use
//! [`try_world_position`] and report the defect themselves.

use glam::{Affine2, Vec2};

use crate::model::{Boundary, Node, Point, Port, PortRole, Size};

/// Fallback for ports that cannot be resolved.
pub const FALLBACK_POSITION: Point = Point::new(0.0, 0.0);

/// Axis-aligned rectangle in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn from_position_size(position: Point, size: Size) -> Self {
        let min = position.to_vec2();
        Self {
            min,
            max: min + size.to_vec2(),
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn expand(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    /// True when `p` lies within `band` of any edge, on either side.
    pub fn border_contains(&self, p: Vec2, band: f32) -> bool {
        if !self.expand(band).contains(p) {
            return false;
        }
        let inner = self.expand(-band);
        // A rectangle thinner than two bands is all border.
        if inner.min.x > inner.max.x || inner.min.y > inner.max.y {
            return true;
        }
        !(p.x > inner.min.x && p.x < inner.max.x && p.y > inner.min.y && p.y < inner.max.y)
    }
}

/// Local-to-world transform of a node: translation to its body center.
pub fn node_transform(node: &Node) -> Affine2 {
    Affine2::from_translation(node.center().to_vec2())
}

/// World position of `node.ports[port_index]`, or `None` when the port is
/// missing or its offset (or the node position) is not a finite number.
pub fn try_world_position(node: &Node, port_index: usize) -> Option<Point> {
    try_world_position_in(Affine2::IDENTITY, node, port_index)
}

/// Same as [`try_world_position`] under an extra parent transform.
pub fn try_world_position_in(parent: Affine2, node: &Node, port_index: usize) -> Option<Point> {
    let port = node.ports.get(port_index)?;
    if !port.local_position.is_finite() || !node.position.is_finite() {
        return None;
    }
    let world = (parent * node_transform(node)).transform_point2(port.local_position.to_vec2());
    world.is_finite().then(|| Point::from_vec2(world))
}

/// World position of a port, falling back to [`FALLBACK_POSITION`].
pub fn world_position(node: &Node, port_index: usize) -> Point {
    try_world_position(node, port_index).unwrap_or(FALLBACK_POSITION)
}

/// Bounding box of a node body.
pub fn node_rect(node: &Node) -> Rect {
    Rect::from_position_size(node.position, node.size)
}

pub fn boundary_rect(boundary: &Boundary) -> Rect {
    Rect::from_position_size(boundary.position, boundary.size)
}

/// Fixed offset of a port slot relative to the node center.
///
/// `in` sits on the left edge, `out` on the right edge, and additional ports
/// stack downward from the `out` slot by `spacing` per existing port beyond
/// the first.
pub fn slot_offset(role: PortRole, size: Size, current_port_count: usize, spacing: f32) -> Point {
    let half_w = size.width * 0.5;
    match role {
        PortRole::In => Point::new(-half_w, 0.0),
        PortRole::Out => Point::new(half_w, 0.0),
        PortRole::Additional => {
            let step = current_port_count.saturating_sub(1) as f32;
            Point::new(half_w, spacing * step)
        }
    }
}

/// The two ports every node starts with: one `in`, one `out`.
pub fn default_ports(size: Size) -> Vec<Port> {
    vec![
        Port::new(PortRole::In, slot_offset(PortRole::In, size, 0, 0.0)),
        Port::new(PortRole::Out, slot_offset(PortRole::Out, size, 1, 0.0)),
    ]
}

pub fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeId, NodeKind, SecurityAttributes};

    fn node_at(x: f32, y: f32) -> Node {
        let size = Size::new(130.0, 40.0);
        Node {
            id: NodeId(1),
            kind: NodeKind::WebApp,
            label: "Web App".into(),
            sublabel: String::new(),
            position: Point::new(x, y),
            size,
            ports: default_ports(size),
            security: SecurityAttributes::default(),
            locked: false,
            is_template: false,
        }
    }

    #[test]
    fn test_default_ports_sit_on_the_edges() {
        let n = node_at(100.0, 200.0);
        assert_eq!(world_position(&n, 0), Point::new(100.0, 220.0));
        assert_eq!(world_position(&n, 1), Point::new(230.0, 220.0));
    }

    #[test]
    fn test_malformed_offset_falls_back() {
        let mut n = node_at(0.0, 0.0);
        n.ports[0].local_position = Point::new(f32::NAN, 3.0);
        assert_eq!(try_world_position(&n, 0), None);
        assert_eq!(world_position(&n, 0), FALLBACK_POSITION);
        assert_eq!(world_position(&n, 9), FALLBACK_POSITION);
    }

    #[test]
    fn test_parent_transform_is_applied() {
        let n = node_at(0.0, 0.0);
        let parent = Affine2::from_translation(Vec2::new(10.0, 5.0));
        let p = try_world_position_in(parent, &n, 1).unwrap();
        assert_eq!(p, Point::new(140.0, 25.0));

        let rotated = Affine2::from_angle(std::f32::consts::FRAC_PI_2);
        let p = try_world_position_in(rotated, &n, 1).unwrap();
        // (130, 20) rotated by 90 degrees
        assert!((p.x + 20.0).abs() < 1e-3 && (p.y - 130.0).abs() < 1e-3);
    }

    #[test]
    fn test_additional_slots_stack() {
        let size = Size::new(130.0, 40.0);
        assert_eq!(slot_offset(PortRole::Additional, size, 2, 15.0), Point::new(65.0, 15.0));
        assert_eq!(slot_offset(PortRole::Additional, size, 3, 15.0), Point::new(65.0, 30.0));
    }

    #[test]
    fn test_border_band() {
        let r = Rect::from_position_size(Point::new(0.0, 0.0), Size::new(100.0, 100.0));
        assert!(r.border_contains(Vec2::new(0.0, 50.0), 10.0));
        assert!(r.border_contains(Vec2::new(-5.0, 50.0), 10.0));
        assert!(r.border_contains(Vec2::new(95.0, 95.0), 10.0));
        assert!(!r.border_contains(Vec2::new(50.0, 50.0), 10.0));
        assert!(!r.border_contains(Vec2::new(200.0, 50.0), 10.0));
    }

    #[test]
    fn test_distance_to_segment() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(distance_to_segment(Vec2::new(5.0, 3.0), a, b), 3.0);
        assert_eq!(distance_to_segment(Vec2::new(-4.0, 3.0), a, b), 5.0);
        assert_eq!(distance_to_segment(Vec2::new(1.0, 1.0), a, a), 2f32.sqrt());
    }
}
