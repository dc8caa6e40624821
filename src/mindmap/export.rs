use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{Cursor, Write as _};
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use super::{MindMap, Point, Transform, node_radius};
use crate::error::ExportError;
use crate::formats::FlatNode;
use crate::search::escape_html;
use crate::text;

const MAX_SURFACE_SIDE: u32 = 8192;
const MAX_LABEL_CHARS: usize = 30;
const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const EDGE: Rgba<u8> = Rgba([153, 153, 153, 255]);
const FALLBACK_FILL: Rgba<u8> = Rgba([127, 140, 141, 255]);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Svg,
    Png,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}

/// `mindmap-20240131-142501.png` style name for the current local time.
pub fn default_file_name(format: ExportFormat) -> String {
    format!(
        "mindmap-{}.{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        format.extension()
    )
}

pub fn export(map: &MindMap, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Svg => export_svg(map).map(String::into_bytes),
        ExportFormat::Png => export_png(map),
    }
}

struct Frame<'a> {
    width: u32,
    height: u32,
    transform: Transform,
    nodes: Vec<(&'a FlatNode, Point)>,
    edges: Vec<(Point, Point)>,
}

// Everything visible, drawn with the viewport's current pan and zoom. Callers that
// want the whole graph in frame call `MindMap::reset_view` first.
fn frame(map: &MindMap) -> Result<Frame<'_>, ExportError> {
    let viewport = map.viewport();
    if viewport.width == 0 || viewport.height == 0 {
        return Err(ExportError::EmptySurface {
            width: viewport.width,
            height: viewport.height,
        });
    }
    if viewport.width > MAX_SURFACE_SIDE || viewport.height > MAX_SURFACE_SIDE {
        return Err(ExportError::Encode(format!(
            "surface {}x{} exceeds {MAX_SURFACE_SIDE}px",
            viewport.width, viewport.height
        )));
    }

    let nodes = map
        .visible_nodes()
        .into_iter()
        .filter_map(|node| Some((node, map.position(&node.id)?)))
        .collect::<Vec<_>>();
    if nodes.is_empty() {
        return Err(ExportError::NothingVisible);
    }

    let edges = nodes
        .iter()
        .filter_map(|(node, at)| {
            let parent = map.position(node.parent.as_deref()?)?;
            Some((parent, *at))
        })
        .collect();

    Ok(Frame {
        width: viewport.width,
        height: viewport.height,
        transform: viewport.transform(),
        nodes,
        edges,
    })
}

fn logged<T>(result: Result<T, ExportError>, format: ExportFormat) -> Result<T, ExportError> {
    if let Err(err) = &result {
        tracing::warn!(format = format.extension(), %err, "mind map export failed");
    }
    result
}

pub fn export_svg(map: &MindMap) -> Result<String, ExportError> {
    logged(frame(map).map(|frame| render_svg(&frame)), ExportFormat::Svg)
}

fn render_svg(frame: &Frame<'_>) -> String {
    let t = frame.transform;
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = frame.width,
        h = frame.height
    );
    let _ = writeln!(out, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##);
    let _ = writeln!(
        out,
        r#"<g transform="translate({:.2},{:.2}) scale({:.4})">"#,
        t.x, t.y, t.k
    );
    for (from, to) in &frame.edges {
        let _ = writeln!(
            out,
            r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="#999999" stroke-width="2"/>"##,
            from.x, from.y, to.x, to.y
        );
    }
    for (node, at) in &frame.nodes {
        let radius = node_radius(node.kind);
        let _ = writeln!(
            out,
            r#"<g class="node" data-id="{id}"><circle cx="{x:.2}" cy="{y:.2}" r="{radius}" fill="{fill}"/><text x="{x:.2}" y="{ty:.2}" text-anchor="middle" font-size="12">{label}</text></g>"#,
            id = escape_html(&node.id),
            x = at.x,
            y = at.y,
            fill = escape_html(&node.color),
            ty = at.y + radius + 14.0,
            label = escape_html(&text::truncate_chars(&node.label, MAX_LABEL_CHARS)),
        );
    }
    out.push_str("</g>\n</svg>\n");
    out
}

/// Rasterizes nodes and edges; labels are left to the SVG export.
pub fn export_png(map: &MindMap) -> Result<Vec<u8>, ExportError> {
    logged(frame(map).and_then(|frame| render_png(&frame)), ExportFormat::Png)
}

fn render_png(frame: &Frame<'_>) -> Result<Vec<u8>, ExportError> {
    let t = frame.transform;
    let mut img = RgbaImage::from_pixel(frame.width, frame.height, BACKGROUND);

    for (from, to) in &frame.edges {
        draw_line(&mut img, t.apply(*from), t.apply(*to), EDGE);
    }
    for (node, at) in &frame.nodes {
        let fill = parse_hex_color(&node.color).unwrap_or(FALLBACK_FILL);
        draw_disc(&mut img, t.apply(*at), node_radius(node.kind) * t.k, fill);
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| ExportError::Encode(err.to_string()))?;
    Ok(bytes)
}

fn put(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_line(img: &mut RgbaImage, from: Point, to: Point, color: Rgba<u8>) {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let s = i as f64 / steps as f64;
        put(
            img,
            (from.x + dx * s).round() as i64,
            (from.y + dy * s).round() as i64,
            color,
        );
    }
}

fn draw_disc(img: &mut RgbaImage, centre: Point, radius: f64, color: Rgba<u8>) {
    let r = radius.max(1.0);
    let (x0, x1) = ((centre.x - r).floor() as i64, (centre.x + r).ceil() as i64);
    let (y0, y1) = ((centre.y - r).floor() as i64, (centre.y + r).ceil() as i64);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let (px, py) = (x as f64 - centre.x, y as f64 - centre.y);
            if px * px + py * py <= r * r {
                put(img, x, y, color);
            }
        }
    }
}

/// `#rrggbb` or `#rgb`.
pub fn parse_hex_color(raw: &str) -> Option<Rgba<u8>> {
    let digits = raw.trim().strip_prefix('#')?;
    let expanded = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => digits.to_owned(),
        _ => return None,
    };
    let bytes = hex::decode(expanded).ok()?;
    Some(Rgba([bytes[0], bytes[1], bytes[2], 255]))
}

/// Writes an export file. Refuses to replace an existing file unless `force`.
pub fn write_export(path: &Path, bytes: &[u8], force: bool) -> Result<(), ExportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|err| ExportError::Io(format!("create {}: {err}", parent.display())))?;
    }
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options
        .open(path)
        .map_err(|err| ExportError::Io(format!("open {}: {err}", path.display())))?;
    file.write_all(bytes)
        .map_err(|err| ExportError::Io(format!("write {}: {err}", path.display())))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "mind map exported");
    Ok(())
}
