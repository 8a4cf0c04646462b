use crate::font;
use crate::ttf::FontRenderer;
use crate::types::{FaceDetection, Frame, Rect};

/// Banner text shown when a scan fails.
pub const ERROR_BANNER: &str = "Error detecting emotion";

/// Text drawing over a frame, backed by a TTF font when one could be
/// loaded and the builtin bitmap font otherwise. Both backends can
/// measure text, so wrapping and background plates work the same way.
pub struct TextPainter {
    ttf: Option<FontRenderer>,
    size_pt: f32,
    bitmap_scale: usize,
}

impl TextPainter {
    pub fn new(ttf: Option<FontRenderer>, size_pt: f32, bitmap_scale: usize) -> Self {
        Self {
            ttf,
            size_pt,
            bitmap_scale: bitmap_scale.max(1),
        }
    }

    /// Deterministic bitmap-only painter. Used by tests and as the last
    /// resort when no system font exists.
    pub fn bitmap(scale: usize) -> Self {
        Self::new(None, 0.0, scale)
    }

    pub fn measure_width(&self, text: &str) -> usize {
        match &self.ttf {
            Some(fr) => fr.measure_width(text, self.size_pt),
            None => font::measure_text_width(text, self.bitmap_scale),
        }
    }

    pub fn line_height(&self) -> usize {
        match &self.ttf {
            Some(fr) => fr.measure_height(self.size_pt),
            None => font::line_height(self.bitmap_scale),
        }
    }

    pub fn draw(&self, frame: &mut Frame, x: usize, y: usize, text: &str, color: (u8, u8, u8)) {
        let (w, h) = frame.dimensions();
        let buffer: &mut [u8] = frame;
        match &self.ttf {
            Some(fr) => {
                fr.draw_text(buffer, w as usize, h as usize, x, y, text, color, self.size_pt)
            }
            None => font::draw_text_line(
                buffer,
                w as usize,
                h as usize,
                x,
                y,
                text,
                color,
                self.bitmap_scale,
            ),
        }
    }
}

/// Colors and spacing for the annotation pass. One style covers the live
/// and the still-photo paths; `highlight_faces` toggles the brightness
/// boost the live scanner applies before boxing.
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub box_color: (u8, u8, u8),
    pub box_alpha: f32,
    pub border_thickness: usize,
    pub dominant_color: (u8, u8, u8),
    pub score_color: (u8, u8, u8),
    pub stress_color: (u8, u8, u8),
    pub quote_color: (u8, u8, u8),
    pub error_color: (u8, u8, u8),
    pub plate_color: (u8, u8, u8),
    pub padding: usize,
    pub line_spacing: usize,
    pub highlight_faces: bool,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_color: (0, 255, 0),
            box_alpha: 0.3,
            border_thickness: 2,
            dominant_color: (0, 255, 0),
            score_color: (255, 255, 255),
            stress_color: (255, 165, 0),
            quote_color: (0, 255, 255),
            error_color: (255, 0, 0),
            plate_color: (0, 0, 0),
            padding: 5,
            line_spacing: 10,
            highlight_faces: true,
        }
    }
}

/// Clamp a float rect to pixel bounds inside the frame. Returns None when
/// nothing of it lies inside.
fn clamp_region(frame: &Frame, region: &Rect) -> Option<(u32, u32, u32, u32)> {
    let (fw, fh) = frame.dimensions();
    let x0 = region.x.max(0.0) as u32;
    let y0 = region.y.max(0.0) as u32;
    let x1 = ((region.x + region.width).min(fw as f32)).max(0.0) as u32;
    let y1 = ((region.y + region.height).min(fh as f32)).max(0.0) as u32;
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

/// Alpha-blend a filled rectangle over the frame.
fn blend_rect(frame: &mut Frame, x: u32, y: u32, w: u32, h: u32, color: (u8, u8, u8), alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for py in y..y + h {
        for px in x..x + w {
            let p = frame.get_pixel_mut(px, py);
            p.0[0] = (color.0 as f32 * alpha + p.0[0] as f32 * (1.0 - alpha)) as u8;
            p.0[1] = (color.1 as f32 * alpha + p.0[1] as f32 * (1.0 - alpha)) as u8;
            p.0[2] = (color.2 as f32 * alpha + p.0[2] as f32 * (1.0 - alpha)) as u8;
        }
    }
}

/// Opaque filled rectangle.
fn fill_rect(frame: &mut Frame, x: u32, y: u32, w: u32, h: u32, color: (u8, u8, u8)) {
    for py in y..y + h {
        for px in x..x + w {
            frame.put_pixel(px, py, image::Rgb([color.0, color.1, color.2]));
        }
    }
}

/// Border of the given thickness, drawn inward from the rectangle edge.
fn draw_rect_border(
    frame: &mut Frame,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    color: (u8, u8, u8),
    thickness: usize,
) {
    let t = (thickness as u32).min(w / 2 + 1).min(h / 2 + 1).max(1);
    fill_rect(frame, x, y, w, t.min(h), color);
    fill_rect(frame, x, y + h - t.min(h), w, t.min(h), color);
    fill_rect(frame, x, y, t.min(w), h, color);
    fill_rect(frame, x + w - t.min(w), y, t.min(w), h, color);
}

/// Brightness/contrast boost over the face region plus a bright contour,
/// so the boxed face stands out from the rest of the frame. Invalid
/// regions are left untouched.
pub fn apply_face_highlight(frame: &mut Frame, region: &Rect) {
    let Some((x, y, w, h)) = clamp_region(frame, region) else {
        return;
    };

    // Scale/offset pass (gain 1.3, bias +20), then a mild unsharp mask.
    let mut roi = image::imageops::crop_imm(frame, x, y, w, h).to_image();
    for p in roi.pixels_mut() {
        for c in 0..3 {
            p.0[c] = (p.0[c] as f32 * 1.3 + 20.0).clamp(0.0, 255.0) as u8;
        }
    }
    let sharpened = image::imageops::unsharpen(&roi, 3.0, 5);
    image::imageops::replace(frame, &sharpened, x as i64, y as i64);

    draw_rect_border(frame, x, y, w, h, (0, 255, 255), 2);
}

/// One plated text line: measure, draw the backing rectangle sized to the
/// text plus padding, then the text itself. Returns the plate height so
/// callers can advance their cursor.
pub fn draw_text_with_background(
    frame: &mut Frame,
    painter: &TextPainter,
    style: &OverlayStyle,
    text: &str,
    x: usize,
    y: usize,
    color: (u8, u8, u8),
) -> usize {
    let (fw, fh) = frame.dimensions();
    let text_w = painter.measure_width(text);
    let text_h = painter.line_height();
    let plate_w = (text_w + 2 * style.padding) as u32;
    let plate_h = (text_h + 2 * style.padding) as u32;

    let px = (x as u32).min(fw.saturating_sub(1));
    let py = (y as u32).min(fh.saturating_sub(1));
    let plate_w = plate_w.min(fw - px);
    let plate_h = plate_h.min(fh - py);
    if plate_w > 0 && plate_h > 0 {
        fill_rect(frame, px, py, plate_w, plate_h, style.plate_color);
    }

    painter.draw(frame, x + style.padding, y + style.padding, text, color);
    text_h + 2 * style.padding
}

/// Greedy word packing. No returned line measures wider than `max_width`
/// unless it is a single word that alone exceeds it.
pub fn wrap_text(painter: &TextPainter, text: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if painter.measure_width(&candidate) > max_width && !current.is_empty() {
            lines.push(current);
            current = word.to_string();
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Word-wrapped block of plated text lines, advancing downward from
/// `origin` by line height plus the style's line spacing.
pub fn draw_wrapped_text(
    frame: &mut Frame,
    painter: &TextPainter,
    style: &OverlayStyle,
    text: &str,
    origin: (usize, usize),
    max_width: usize,
    color: (u8, u8, u8),
) {
    let (x, mut y) = origin;
    for line in wrap_text(painter, text, max_width) {
        let consumed = draw_text_with_background(frame, painter, style, &line, x, y, color);
        y += consumed + style.line_spacing;
    }
}

/// The fixed banner for a failed scan, drawn over the raw snapshot.
pub fn draw_error_banner(frame: &mut Frame, painter: &TextPainter, style: &OverlayStyle) {
    draw_text_with_background(frame, painter, style, ERROR_BANNER, 10, 30, style.error_color);
}

/// Annotate the frame with every detection: blended box, border, dominant
/// label above, per-emotion scores and the stress grade below. Detections
/// with an empty region are skipped without touching the frame.
pub fn draw_detections(
    frame: &mut Frame,
    detections: &[FaceDetection],
    painter: &TextPainter,
    style: &OverlayStyle,
) {
    for face in detections {
        if face.region.is_empty() {
            continue;
        }
        let Some((x, y, w, h)) = clamp_region(frame, &face.region) else {
            continue;
        };

        if style.highlight_faces {
            apply_face_highlight(frame, &face.region);
        }

        blend_rect(frame, x, y, w, h, style.box_color, style.box_alpha);
        draw_rect_border(frame, x, y, w, h, style.box_color, style.border_thickness);

        let line_step = painter.line_height() + 2 * style.padding + 2;

        // Dominant label sits above the box when there is room.
        let dominant_text = format!("Dominant: {}", face.dominant);
        let dom_y = (y as usize).saturating_sub(line_step + 4);
        draw_text_with_background(
            frame,
            painter,
            style,
            &dominant_text,
            x as usize,
            dom_y,
            style.dominant_color,
        );

        // Scores below the box, highest first, then the stress grade.
        let mut y_offset = (y + h) as usize + 10;
        for (emotion, score) in face.scores.sorted_desc() {
            let text = format!("{}: {:.1}%", emotion.title(), score);
            draw_text_with_background(
                frame, painter, style, &text, x as usize, y_offset, style.score_color,
            );
            y_offset += line_step;
        }
        let stress = format!("Stress Grade: {:.1}%", face.scores.stress_grade());
        draw_text_with_background(
            frame, painter, style, &stress, x as usize, y_offset, style.stress_color,
        );
    }
}
