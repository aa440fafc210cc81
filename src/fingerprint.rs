use crate::scene::{ObjectKind, RenderObject, Rgba8};

/// Content fingerprint of a render object: a 128-bit digest of every field
/// that affects its rasterized pixels. Identity (`id`, `z_index`) and
/// translation (`position`) are excluded, so two structurally identical
/// objects anywhere on the canvas share a fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectFingerprint {
    pub hi: u64,
    pub lo: u64,
}

pub fn fingerprint_object(obj: &RenderObject) -> ObjectFingerprint {
    let mut a = Fnv1a64::new(0xcbf29ce484222325);
    let mut b = Fnv1a64::new(0x9ae16a3b2f90404f);

    let t = &obj.transform;
    write_u64_pair(&mut a, &mut b, t.width.to_bits());
    write_u64_pair(&mut a, &mut b, t.height.to_bits());
    write_u64_pair(&mut a, &mut b, t.scale_x.to_bits());
    write_u64_pair(&mut a, &mut b, t.scale_y.to_bits());
    write_u64_pair(&mut a, &mut b, t.rotation.to_bits());

    let s = &obj.style;
    write_rgba_pair(&mut a, &mut b, s.fill);
    match &s.stroke {
        Some(stroke) => {
            write_u8_pair(&mut a, &mut b, 1);
            write_rgba_pair(&mut a, &mut b, stroke.color);
            write_u64_pair(&mut a, &mut b, stroke.width.to_bits());
        }
        None => write_u8_pair(&mut a, &mut b, 0),
    }
    write_u64_pair(&mut a, &mut b, s.opacity.to_bits());
    write_u8_pair(&mut a, &mut b, u8::from(s.visible));

    match &obj.kind {
        ObjectKind::Rect => write_u8_pair(&mut a, &mut b, 0),
        ObjectKind::Ellipse => write_u8_pair(&mut a, &mut b, 1),
        ObjectKind::Text(spec) => {
            write_u8_pair(&mut a, &mut b, 2);
            write_str_pair(&mut a, &mut b, &spec.content);
            write_str_pair(&mut a, &mut b, &spec.font);
            write_u64_pair(&mut a, &mut b, u64::from(spec.size_px.to_bits()));
            match spec.max_width_px {
                Some(w) => {
                    write_u8_pair(&mut a, &mut b, 1);
                    write_u64_pair(&mut a, &mut b, u64::from(w.to_bits()));
                }
                None => write_u8_pair(&mut a, &mut b, 0),
            }
        }
        ObjectKind::Image(spec) => {
            write_u8_pair(&mut a, &mut b, 3);
            write_str_pair(&mut a, &mut b, &spec.source);
        }
        ObjectKind::Path(spec) => {
            write_u8_pair(&mut a, &mut b, 4);
            write_u64_pair(&mut a, &mut b, spec.path.elements().len() as u64);
            for &el in spec.path.elements() {
                write_path_el_pair(&mut a, &mut b, el);
            }
        }
    }

    ObjectFingerprint {
        hi: a.finish(),
        lo: b.finish(),
    }
}

fn write_path_el_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, el: kurbo::PathEl) {
    use kurbo::PathEl;
    match el {
        PathEl::MoveTo(p) => {
            write_u8_pair(a, b, 0);
            write_point_pair(a, b, p);
        }
        PathEl::LineTo(p) => {
            write_u8_pair(a, b, 1);
            write_point_pair(a, b, p);
        }
        PathEl::QuadTo(p1, p2) => {
            write_u8_pair(a, b, 2);
            write_point_pair(a, b, p1);
            write_point_pair(a, b, p2);
        }
        PathEl::CurveTo(p1, p2, p3) => {
            write_u8_pair(a, b, 3);
            write_point_pair(a, b, p1);
            write_point_pair(a, b, p2);
            write_point_pair(a, b, p3);
        }
        PathEl::ClosePath => write_u8_pair(a, b, 4),
    }
}

fn write_point_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, p: kurbo::Point) {
    write_u64_pair(a, b, p.x.to_bits());
    write_u64_pair(a, b, p.y.to_bits());
}

fn write_rgba_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, c: Rgba8) {
    a.write_bytes(&[c.r, c.g, c.b, c.a]);
    b.write_bytes(&[c.r, c.g, c.b, c.a]);
}

fn write_u8_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, v: u8) {
    a.write_u8(v);
    b.write_u8(v);
}

fn write_u64_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, v: u64) {
    a.write_u64(v);
    b.write_u64(v);
}

fn write_str_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, s: &str) {
    write_u64_pair(a, b, s.len() as u64);
    a.write_bytes(s.as_bytes());
    b.write_bytes(s.as_bytes());
}

#[derive(Clone, Copy)]
struct Fnv1a64(u64);

impl Fnv1a64 {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        self.0 = h;
    }

    fn finish(self) -> u64 {
        self.0
    }
}
