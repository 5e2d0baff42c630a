use rand::Rng;

/// Longest chat message relayed, in characters.
pub const MAX_CHAT_LENGTH: usize = 256;
/// Longest player name accepted, in characters.
pub const MAX_NAME_LENGTH: usize = 16;

// Remove anything that looks like a markup tag: '<', at least one non-'>' character, '>'
pub fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('>') {
            Some(end) if end > 0 => rest = &after[end + 1..],
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

// Clean up chat text, None if nothing is left to relay
pub fn sanitize_chat(message: &str) -> Option<String> {
    let stripped = strip_tags(message);
    let trimmed: String = stripped.trim().chars().take(MAX_CHAT_LENGTH).collect();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

// Player name from Hello, falling back to Player<id>
pub fn sanitize_name(name: &str, id: u32) -> String {
    let trimmed: String = name.trim().chars().take(MAX_NAME_LENGTH).collect();
    let trimmed = trimmed.trim_end();

    if trimmed.is_empty() {
        format!("Player{}", id)
    } else {
        trimmed.to_string()
    }
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }

    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * 6.0 * (2.0 / 3.0 - t)
    } else {
        p
    }
}

// Convert HSL (all components in [0, 1]) to a 0xRRGGBB value
pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> u32 {
    let q = if lightness <= 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;

    let channel = |t: f32| (hue_to_rgb(p, q, t).clamp(0.0, 1.0) * 255.0).round() as u32;
    let r = channel(hue + 1.0 / 3.0);
    let g = channel(hue);
    let b = channel(hue - 1.0 / 3.0);

    (r << 16) | (g << 8) | b
}

// Generate a saturated random color for a new unit
pub fn generate_color<R: Rng>(rng: &mut R) -> u32 {
    hsl_to_rgb(rng.gen::<f32>(), 0.9, 0.5)
}
