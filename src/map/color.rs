/// Base colour per GTFS route type.
fn base_color(route_type: u16) -> Option<(u8, u8, u8)> {
    match route_type {
        0 => Some((0xFF, 0x00, 0x00)),
        1 => Some((0x00, 0x00, 0xFF)),
        2 => Some((0x00, 0xAA, 0x00)),
        3 => Some((0xFF, 0x88, 0x00)),
        4 => Some((0xAA, 0x00, 0xAA)),
        100 => Some((0x00, 0x66, 0x00)),
        101 => Some((0xAA, 0x00, 0x00)),
        _ => None,
    }
}

pub fn route_type_label(route_type: u16) -> String {
    match route_type {
        0 => "Trams".to_string(),
        1 => "Subway".to_string(),
        2 => "Rail".to_string(),
        3 => "Bus".to_string(),
        4 => "Ferry".to_string(),
        100 => "High-speed Rail".to_string(),
        101 => "Intercity".to_string(),
        other => format!("Type {other}"),
    }
}

/// Hex colour for route `index` of `total`: a small hue shift around the
/// route type's base colour, or an even spread over the hue circle for
/// unknown types.
pub fn route_color(index: usize, total: usize, route_type: u16) -> String {
    let total = total.max(1) as f64;
    let index = index as f64;
    let (h, s, v) = match base_color(route_type) {
        Some((r, g, b)) => {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            ((h + index / (total * 5.0)).rem_euclid(1.0), s, v)
        }
        None => (index / total, 0.8, 0.9),
    };
    let (r, g, b) = hsv_to_rgb(h, s, v);
    format!("#{r:02x}{g:02x}{b:02x}")
}

fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let (r, g, b) = (f64::from(r) / 255.0, f64::from(g) / 255.0, f64::from(b) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return (0.0, 0.0, max);
    }
    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    (h / 6.0, delta / max, max)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let byte = |x: f64| (x * 255.0).round() as u8;
    (byte(r), byte(g), byte(b))
}
