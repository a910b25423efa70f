use crate::mode::Mode;

use super::image::{color_from_rgba8, Color, Image};

const GLYPH_WIDTH: i32 = 3;
const GLYPH_HEIGHT: i32 = 5;
const TEXT_SCALE: i32 = 2;
const GLYPH_ADVANCE: i32 = (GLYPH_WIDTH + 1) * TEXT_SCALE;
const LINE_ADVANCE: i32 = (GLYPH_HEIGHT + 2) * TEXT_SCALE;
const PANEL_PADDING: i32 = 6 * TEXT_SCALE;
const PANEL_INSET_X: i32 = 4 * TEXT_SCALE;
const PANEL_INSET_Y: i32 = 3 * TEXT_SCALE;
const TEXT_PRIMARY: [u8; 4] = [244, 248, 252, 255];
const TEXT_DIM: [u8; 4] = [176, 198, 220, 255];
const PANEL_BG: [u8; 4] = [10, 12, 16, 210];
const PANEL_BORDER: [u8; 4] = [92, 106, 126, 255];
const BUDGET_BAR_WIDTH: i32 = 160;
const BUDGET_BAR_HEIGHT: i32 = 10;
const BUDGET_FILL: [u8; 4] = [96, 200, 120, 255];
const BUDGET_OVER_FILL: [u8; 4] = [220, 64, 48, 255];
const COMPASS_RADIUS: i32 = 18;
const COMPASS_NEEDLE: [u8; 4] = [232, 72, 56, 255];
const PERF_SECTION: &str = "Perf";
const SCENE_SECTION: &str = "Scene";

/// 3x5 bitmap font for ASCII 32..=126, three bits per row, top row in the high bits.
const FONT: [u16; 95] = [
    0x0000, 0x2482, 0x5a00, 0x5f7d, 0x7ddf, 0x52a5, 0x2aab, 0x2400,
    0x1491, 0x4494, 0x0aa8, 0x05d0, 0x0014, 0x01c0, 0x0002, 0x12a4,
    0x7b6f, 0x2c97, 0x73e7, 0x73cf, 0x5bc9, 0x79cf, 0x79ef, 0x7292,
    0x7bef, 0x7bcf, 0x0410, 0x0414, 0x1511, 0x0e38, 0x4454, 0x72c2,
    0x7be7, 0x2bed, 0x6bae, 0x7927, 0x6b6e, 0x79a7, 0x79a4, 0x796f,
    0x5bed, 0x7497, 0x726f, 0x5bad, 0x4927, 0x5fed, 0x5ffd, 0x7b6f,
    0x6ba4, 0x7b79, 0x6bad, 0x79cf, 0x7492, 0x5b6f, 0x5b6a, 0x5bfd,
    0x5aad, 0x5a92, 0x72a7, 0x6926, 0x4889, 0x324b, 0x2a00, 0x0007,
    0x4400, 0x0e7f, 0x49ae, 0x0f27, 0x13ef, 0x0fa7, 0x39a4, 0x0f79,
    0x49ad, 0x2092, 0x106a, 0x4bad, 0x4927, 0x0ded, 0x0d6d, 0x0f6f,
    0x0d74, 0x0f79, 0x0d64, 0x0f8f, 0x2e93, 0x0b6f, 0x0b6a, 0x0b7a,
    0x0a95, 0x0b79, 0x0e57, 0x3593, 0x2492, 0x64d6, 0x0780,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetHud {
    pub total_cost: f32,
    pub budget: f32,
    pub fraction_full: f32,
    pub over_budget: bool,
}

/// Everything the corner panel prints. Perf lines arrive preformatted from the loop.
#[derive(Debug, Clone, Default)]
pub struct OverlayData {
    pub mode: Mode,
    pub actor_count: usize,
    pub ghost_count: usize,
    pub rejected_count: u64,
    pub strategy: &'static str,
    pub perf_lines: Vec<String>,
    pub budget: Option<BudgetHud>,
}

pub fn draw_overlay(target: &mut Image, data: &OverlayData) {
    if target.width() == 0 || target.height() == 0 {
        return;
    }
    let lines = build_overlay_lines(data);
    draw_panel(target, PANEL_PADDING, PANEL_PADDING, &lines);
}

fn build_overlay_lines(data: &OverlayData) -> Vec<String> {
    let mut lines = Vec::new();
    if !data.perf_lines.is_empty() {
        lines.push(PERF_SECTION.to_string());
        lines.extend(data.perf_lines.iter().cloned());
        lines.push(String::new());
    }
    lines.push(SCENE_SECTION.to_string());
    lines.push(format!("Mode: {:?}", data.mode));
    lines.push(format!("Actors: {}", data.actor_count));
    lines.push(format!("Ghosts: {}", data.ghost_count));
    lines.push(format!("Render: {}", data.strategy));
    if data.rejected_count > 0 {
        lines.push(format!("Rejected: {}", data.rejected_count));
    }
    if let Some(budget) = data.budget {
        lines.push(format_budget_line(budget));
    }
    lines
}

fn format_budget_line(budget: BudgetHud) -> String {
    format!(
        "Budget: {:.1}/{:.0} ({:.0}%)",
        budget.total_cost,
        budget.budget,
        budget.fraction_full * 100.0
    )
}

/// Horizontal meter along the top-right edge; red once the level is over budget.
pub fn draw_budget_hud(target: &mut Image, budget: BudgetHud) {
    let left = target.width() as i32 - BUDGET_BAR_WIDTH - PANEL_PADDING;
    let top = PANEL_PADDING;
    fill_rect(
        target,
        left - 1,
        top - 1,
        BUDGET_BAR_WIDTH + 2,
        BUDGET_BAR_HEIGHT + 2,
        PANEL_BORDER,
    );
    fill_rect(target, left, top, BUDGET_BAR_WIDTH, BUDGET_BAR_HEIGHT, PANEL_BG);
    let fill = (budget.fraction_full.clamp(0.0, 1.0) * BUDGET_BAR_WIDTH as f32).round() as i32;
    let color = if budget.over_budget {
        BUDGET_OVER_FILL
    } else {
        BUDGET_FILL
    };
    fill_rect(target, left, top, fill, BUDGET_BAR_HEIGHT, color);
}

/// Compass disc in the bottom-right corner; the needle points at world +Y.
pub fn draw_compass(target: &mut Image, heading_radians: f32) {
    let center_x = target.width() as i32 - COMPASS_RADIUS - PANEL_PADDING;
    let center_y = target.height() as i32 - COMPASS_RADIUS - PANEL_PADDING;
    let bg = color_from_rgba8(PANEL_BG);
    for dy in -COMPASS_RADIUS..=COMPASS_RADIUS {
        for dx in -COMPASS_RADIUS..=COMPASS_RADIUS {
            if dx * dx + dy * dy <= COMPASS_RADIUS * COMPASS_RADIUS {
                blend_pixel(target, center_x + dx, center_y + dy, bg);
            }
        }
    }
    let needle = color_from_rgba8(COMPASS_NEEDLE);
    let (sin, cos) = heading_radians.sin_cos();
    for step in 0..COMPASS_RADIUS {
        let x = center_x + (sin * step as f32).round() as i32;
        let y = center_y - (cos * step as f32).round() as i32;
        blend_pixel(target, x, y, needle);
    }
}

/// Team scores stacked down the right edge below the budget meter.
pub fn draw_scores(target: &mut Image, scores: &[(u8, i32)]) {
    if scores.is_empty() {
        return;
    }
    let lines: Vec<String> = scores
        .iter()
        .map(|(team, value)| format!("T{team}: {value}"))
        .collect();
    let widest = lines.iter().map(|line| line.len() as i32).max().unwrap_or(0);
    let left = target.width() as i32 - widest * GLYPH_ADVANCE - PANEL_PADDING * 2;
    draw_panel(target, left, PANEL_PADDING * 3, &lines);
}

/// Centered single-line notice, used by message-stack entries.
pub fn draw_notice(target: &mut Image, text: &str) {
    let width = text.chars().count() as i32 * GLYPH_ADVANCE;
    let left = (target.width() as i32 - width) / 2;
    let top = (target.height() as i32 - LINE_ADVANCE) / 2;
    draw_panel(target, left, top, &[text.to_string()]);
}

fn draw_panel(target: &mut Image, left: i32, top: i32, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let longest = lines
        .iter()
        .map(|line| line.chars().count() as i32)
        .max()
        .unwrap_or(0);
    let panel_width = longest * GLYPH_ADVANCE + PANEL_INSET_X * 2;
    let panel_height = lines.len() as i32 * LINE_ADVANCE + PANEL_INSET_Y * 2;
    let panel_left = left - PANEL_INSET_X;
    let panel_top = top - PANEL_INSET_Y;
    fill_rect(target, panel_left, panel_top, panel_width, panel_height, PANEL_BG);
    outline_rect(target, panel_left, panel_top, panel_width, panel_height);

    let mut y = top;
    for line in lines {
        let color = if matches!(line.as_str(), PERF_SECTION | SCENE_SECTION) {
            TEXT_DIM
        } else {
            TEXT_PRIMARY
        };
        draw_text(target, left, y, line, color);
        y += LINE_ADVANCE;
    }
}

pub(crate) fn draw_text(target: &mut Image, mut x: i32, y: i32, text: &str, rgba: [u8; 4]) {
    let color = color_from_rgba8(rgba);
    for ch in text.chars() {
        draw_glyph(target, x, y, glyph_bits(ch), color);
        x += GLYPH_ADVANCE;
    }
}

/// Unknown characters draw as a space.
fn glyph_bits(ch: char) -> u16 {
    let code = ch as u32;
    if (32..=126).contains(&code) {
        FONT[(code - 32) as usize]
    } else {
        0
    }
}

fn draw_glyph(target: &mut Image, x: i32, y: i32, bits: u16, color: Color) {
    for row in 0..GLYPH_HEIGHT {
        let row_bits = (bits >> ((GLYPH_HEIGHT - 1 - row) * GLYPH_WIDTH)) & 0b111;
        for col in 0..GLYPH_WIDTH {
            if row_bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            let left = x + col * TEXT_SCALE;
            let top = y + row * TEXT_SCALE;
            for sy in 0..TEXT_SCALE {
                for sx in 0..TEXT_SCALE {
                    blend_pixel(target, left + sx, top + sy, color);
                }
            }
        }
    }
}

fn blend_pixel(target: &mut Image, x: i32, y: i32, color: Color) {
    if x < 0 || y < 0 {
        return;
    }
    target.blend(x as u32, y as u32, color);
}

fn fill_rect(target: &mut Image, x: i32, y: i32, width: i32, height: i32, rgba: [u8; 4]) {
    target.fill_rect(x, y, width, height, color_from_rgba8(rgba));
}

fn outline_rect(target: &mut Image, x: i32, y: i32, width: i32, height: i32) {
    if width <= 1 || height <= 1 {
        return;
    }
    fill_rect(target, x, y, width, 1, PANEL_BORDER);
    fill_rect(target, x, y + height - 1, width, 1, PANEL_BORDER);
    fill_rect(target, x, y, 1, height, PANEL_BORDER);
    fill_rect(target, x + width - 1, y, 1, height, PANEL_BORDER);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::image::{blend_over, color_to_rgba8, BLACK};

    fn lit_pixels(image: &Image) -> usize {
        image
            .pixels()
            .iter()
            .filter(|pixel| pixel[0] > 0.0 || pixel[1] > 0.0 || pixel[2] > 0.0)
            .count()
    }

    #[test]
    fn printable_ascii_has_glyphs_except_space() {
        assert_eq!(glyph_bits(' '), 0);
        for code in 33u8..=126u8 {
            assert_ne!(glyph_bits(char::from(code)), 0, "missing glyph {code}");
        }
        assert_eq!(glyph_bits('\u{7f}'), 0);
    }

    #[test]
    fn digit_one_matches_bitmap() {
        // 010 / 110 / 010 / 010 / 111
        assert_eq!(glyph_bits('1'), 0b010_110_010_010_111);
    }

    #[test]
    fn text_drawing_clips_at_every_edge() {
        let mut tiny = Image::filled(1, 1, BLACK);
        draw_text(&mut tiny, -10, -10, "Frame", TEXT_PRIMARY);
        let mut empty = Image::new(0, 8);
        draw_text(&mut empty, 0, 0, "Actors", TEXT_PRIMARY);

        let mut image = Image::filled(8, 8, BLACK);
        draw_text(&mut image, 64, 64, "TPS", TEXT_PRIMARY);
        assert_eq!(lit_pixels(&image), 0);
    }

    #[test]
    fn overlay_lists_budget_and_mode() {
        let data = OverlayData {
            mode: Mode::EditObject,
            actor_count: 4,
            strategy: "full",
            budget: Some(BudgetHud {
                total_cost: 150.0,
                budget: 300.0,
                fraction_full: 0.5,
                over_budget: false,
            }),
            ..OverlayData::default()
        };
        let lines = build_overlay_lines(&data);
        assert_eq!(lines[0], SCENE_SECTION);
        assert_eq!(lines[1], "Mode: EditObject");
        assert_eq!(lines.last().map(String::as_str), Some("Budget: 150.0/300 (50%)"));
    }

    #[test]
    fn panel_writes_backing_plate() {
        let mut image = Image::filled(320, 180, BLACK);
        draw_overlay(&mut image, &OverlayData::default());
        let plate_x = (PANEL_PADDING - PANEL_INSET_X + 1) as u32;
        let plate_y = (PANEL_PADDING - PANEL_INSET_Y + 1) as u32;
        let expected = blend_over(BLACK, color_from_rgba8(PANEL_BG));
        assert_eq!(image.get(plate_x, plate_y), expected);
        assert!(lit_pixels(&image) > 0);
    }

    #[test]
    fn budget_bar_turns_red_when_over() {
        let mut image = Image::filled(400, 100, BLACK);
        draw_budget_hud(
            &mut image,
            BudgetHud {
                total_cost: 305.0,
                budget: 300.0,
                fraction_full: 1.0,
                over_budget: true,
            },
        );
        let left = 400 - BUDGET_BAR_WIDTH - PANEL_PADDING;
        let pixel = color_to_rgba8(image.get(left as u32 + 2, PANEL_PADDING as u32 + 2));
        assert_eq!(&pixel[..3], &BUDGET_OVER_FILL[..3]);
    }
}
