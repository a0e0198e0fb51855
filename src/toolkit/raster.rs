//! Rasterizado de un grafo molecular a PNG.
//!
//! Dibuja sobre un lienzo RGBA blanco: primero los resaltados (una sola
//! capa translúcida), luego los enlaces con antialiasing, las etiquetas de
//! átomo y por último las notas pequeñas (cargas, estereo, índices).

use std::io::Cursor;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::models::{BondOrder, Depiction, MolecularGraph};
use crate::toolkit::elements::{self, CARBON};
use crate::toolkit::error::RenderError;
use crate::toolkit::layout::{self, Point};
use crate::toolkit::{Highlight, RenderOptions};

const GLYPH: f64 = 8.0;
const ADVANCE: f64 = 7.0;
const NOTE_COLOR: [u8; 3] = [30, 30, 30];
const INDEX_COLOR: [u8; 3] = [90, 90, 200];

pub fn render(graph: &MolecularGraph, options: &RenderOptions) -> Result<Depiction, RenderError> {
    if graph.is_empty() {
        return Err(RenderError::EmptyGraph);
    }
    let (width, height) = (options.width, options.height);
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidSize { width, height });
    }

    let coordinates = layout::compute_coordinates(graph);
    let transform = Transform::fit(&coordinates, width, height);
    let points: Vec<[f64; 2]> = coordinates.iter().map(|&p| transform.apply(p)).collect();
    let bond_px = transform.scale;

    let labels: Vec<Option<AtomLabel>> = graph
        .atoms()
        .iter()
        .map(|atom| AtomLabel::for_atom(graph, atom.index))
        .collect();
    let longest = labels.iter().flatten().map(|l| l.text.len()).max().unwrap_or(0);
    let font_scale = if bond_px >= 36.0 && longest <= 3 { 2.0 } else { 1.0 };
    let line_half = (bond_px * 0.03).clamp(0.6, 1.6);

    let mut canvas = Canvas::new(width, height);

    if let Some(highlight) = &options.highlight {
        draw_highlight(&mut canvas, graph, &points, highlight, line_half, bond_px);
    }

    for bond in graph.bonds() {
        let clearance = |atom: usize| {
            if labels[atom].is_some() {
                GLYPH * font_scale * 0.7
            } else {
                0.0
            }
        };
        let (a, b) = shorten(
            points[bond.begin],
            points[bond.end],
            clearance(bond.begin),
            clearance(bond.end),
        );
        let colors = (
            elements::color(graph.atom(bond.begin).atomic_number),
            elements::color(graph.atom(bond.end).atomic_number),
        );
        let full = (points[bond.begin], points[bond.end]);

        match bond.order {
            BondOrder::Single => canvas.split_segment(a, b, line_half, colors),
            BondOrder::Double => {
                let offset = bond_px * 0.16;
                match inner_side(graph, &points, bond.index) {
                    Some(side) => {
                        canvas.split_segment(a, b, line_half, colors);
                        let (ia, ib) = inner_line(full, a, b, side, offset);
                        canvas.split_segment(ia, ib, line_half, colors);
                    }
                    None => {
                        let n = normal(full.0, full.1);
                        let half = offset / 2.0;
                        canvas.split_segment(shift(a, n, half), shift(b, n, half), line_half, colors);
                        canvas.split_segment(shift(a, n, -half), shift(b, n, -half), line_half, colors);
                    }
                }
            }
            BondOrder::Triple | BondOrder::Quadruple => {
                let n = normal(full.0, full.1);
                let offset = bond_px * 0.14;
                canvas.split_segment(a, b, line_half, colors);
                canvas.split_segment(shift(a, n, offset), shift(b, n, offset), line_half, colors);
                canvas.split_segment(shift(a, n, -offset), shift(b, n, -offset), line_half, colors);
            }
        }
    }

    for (atom, label) in labels.iter().enumerate() {
        if let Some(label) = label {
            label.draw(&mut canvas, points[atom], font_scale);
        }
    }

    if options.show_property_labels {
        for atom in graph.atoms() {
            if let Some(note) = &atom.note {
                let direction = free_direction(graph, &points, atom.index);
                let centre = shift(points[atom.index], direction, bond_px * 0.42);
                canvas.text_box(centre, note, 1.0, NOTE_COLOR);
            }
        }
        for bond in graph.bonds() {
            if let Some(note) = &bond.note {
                let (a, b) = (points[bond.begin], points[bond.end]);
                let mut n = normal(a, b);
                if n[1] > 0.0 {
                    n = [-n[0], -n[1]];
                }
                let middle = [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0];
                canvas.text_box(shift(middle, n, bond_px * 0.3), note, 1.0, NOTE_COLOR);
            }
        }
    }

    if options.show_atom_indices {
        for atom in graph.atoms() {
            let [x, y] = points[atom.index];
            let anchor = [x + GLYPH * font_scale * 0.5 + 4.0, y + GLYPH * font_scale * 0.5];
            canvas.text_box(anchor, &atom.index.to_string(), 1.0, INDEX_COLOR);
        }
    }

    let png = canvas.encode()?;
    Ok(Depiction {
        png,
        width,
        height,
        caption: options.caption.clone(),
    })
}

/// Modelo (unidades de enlace, y hacia arriba) → píxeles (y hacia abajo).
#[derive(Debug, Clone, Copy)]
struct Transform {
    scale: f64,
    ox: f64,
    oy: f64,
}

impl Transform {
    fn fit(coordinates: &[Point], width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        let (mut min_x, mut max_x, mut min_y, mut max_y) =
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for p in coordinates {
            min_x = min_x.min(p[0]);
            max_x = max_x.max(p[0]);
            min_y = min_y.min(p[1]);
            max_y = max_y.max(p[1]);
        }
        let padding = (w.min(h) * 0.08).max(8.0);
        let fit = |available: f64, extent: f64| {
            if extent > 1e-6 {
                (available - 2.0 * padding).max(1.0) / extent
            } else {
                f64::INFINITY
            }
        };
        let scale = fit(w, max_x - min_x)
            .min(fit(h, max_y - min_y))
            .min(w.min(h) * 0.2);
        Self {
            scale,
            ox: w / 2.0 - (min_x + max_x) / 2.0 * scale,
            oy: h / 2.0 + (min_y + max_y) / 2.0 * scale,
        }
    }

    fn apply(&self, p: Point) -> [f64; 2] {
        [self.ox + p[0] * self.scale, self.oy - p[1] * self.scale]
    }
}

fn normal(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let length = (dx * dx + dy * dy).sqrt().max(1e-9);
    [-dy / length, dx / length]
}

fn shift(p: [f64; 2], direction: [f64; 2], amount: f64) -> [f64; 2] {
    [p[0] + direction[0] * amount, p[1] + direction[1] * amount]
}

/// Recorta el segmento por cada extremo (hueco para las etiquetas).
fn shorten(a: [f64; 2], b: [f64; 2], cut_a: f64, cut_b: f64) -> ([f64; 2], [f64; 2]) {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let length = (dx * dx + dy * dy).sqrt();
    if length <= cut_a + cut_b + 1.0 {
        return (a, b);
    }
    let (ux, uy) = (dx / length, dy / length);
    (
        [a[0] + ux * cut_a, a[1] + uy * cut_a],
        [b[0] - ux * cut_b, b[1] - uy * cut_b],
    )
}

/// Lado (normal unitaria) hacia el que se dibuja la segunda línea de un doble
/// enlace: el centro del anillo o, fuera de anillos, el lado con más
/// sustituyentes. `None` para dobles enlaces terminales (se centran).
fn inner_side(graph: &MolecularGraph, points: &[[f64; 2]], bond: usize) -> Option<[f64; 2]> {
    let entry = graph.bond(bond);
    let (a, b) = (points[entry.begin], points[entry.end]);
    let n = normal(a, b);
    let middle = [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0];
    let side_of = |p: [f64; 2]| (p[0] - middle[0]) * n[0] + (p[1] - middle[1]) * n[1];

    if entry.in_ring {
        let ring = graph
            .rings()
            .iter()
            .filter(|ring| ring.contains(&entry.begin) && ring.contains(&entry.end))
            .min_by_key(|ring| ring.len())?;
        let size = ring.len() as f64;
        let centre = ring.iter().fold([0.0, 0.0], |acc, &atom| {
            [acc[0] + points[atom][0] / size, acc[1] + points[atom][1] / size]
        });
        return Some(if side_of(centre) >= 0.0 { n } else { [-n[0], -n[1]] });
    }

    let mut balance = 0.0;
    let mut substituents = 0;
    for (atom, partner) in [(entry.begin, entry.end), (entry.end, entry.begin)] {
        for (_, other) in graph.neighbors(atom) {
            if other != partner {
                balance += side_of(points[other]).signum();
                substituents += 1;
            }
        }
    }
    if substituents == 0 || graph.degree(entry.begin) == 1 || graph.degree(entry.end) == 1 {
        return None;
    }
    Some(if balance >= 0.0 { n } else { [-n[0], -n[1]] })
}

/// Segunda línea de un doble enlace, desplazada y acortada un 15 %.
fn inner_line(
    full: ([f64; 2], [f64; 2]),
    a: [f64; 2],
    b: [f64; 2],
    side: [f64; 2],
    offset: f64,
) -> ([f64; 2], [f64; 2]) {
    let (dx, dy) = (full.1[0] - full.0[0], full.1[1] - full.0[1]);
    let trim = (dx * dx + dy * dy).sqrt() * 0.15;
    let (a, b) = shorten(a, b, trim, trim);
    (shift(a, side, offset), shift(b, side, offset))
}

/// Dirección opuesta a la media de los vecinos (hacia arriba si no hay).
fn free_direction(graph: &MolecularGraph, points: &[[f64; 2]], atom: usize) -> [f64; 2] {
    let origin = points[atom];
    let mut sum = [0.0, 0.0];
    for (_, other) in graph.neighbors(atom) {
        let (dx, dy) = (points[other][0] - origin[0], points[other][1] - origin[1]);
        let length = (dx * dx + dy * dy).sqrt().max(1e-9);
        sum[0] -= dx / length;
        sum[1] -= dy / length;
    }
    let length = (sum[0] * sum[0] + sum[1] * sum[1]).sqrt();
    if length < 1e-6 {
        [0.0, -1.0]
    } else {
        [sum[0] / length, sum[1] / length]
    }
}

fn draw_highlight(
    canvas: &mut Canvas,
    graph: &MolecularGraph,
    points: &[[f64; 2]],
    highlight: &Highlight,
    line_half: f64,
    bond_px: f64,
) {
    let mut mask = vec![0.0f64; (canvas.width * canvas.height) as usize];
    let (w, h) = (canvas.width, canvas.height);
    let band = (highlight.bond_width_multiplier * line_half / 2.0).min(bond_px * 0.3);
    let radius = (bond_px * 0.3).max(band);

    let mut mark = |x: u32, y: u32, coverage: f64| {
        let cell = &mut mask[(y * w + x) as usize];
        *cell = cell.max(coverage);
    };
    for &bond in &highlight.bonds {
        if bond < graph.bond_count() {
            let entry = graph.bond(bond);
            cover_segment(w, h, points[entry.begin], points[entry.end], band, &mut mark);
        }
    }
    for &atom in &highlight.atoms {
        if atom < graph.atom_count() {
            cover_segment(w, h, points[atom], points[atom], radius, &mut mark);
        }
    }

    let [r, g, b, a] = highlight.color.0;
    let alpha = a as f64 / 255.0;
    for y in 0..h {
        for x in 0..w {
            let coverage = mask[(y * w + x) as usize];
            if coverage > 0.0 {
                canvas.blend(x, y, [r, g, b], coverage * alpha);
            }
        }
    }
}

/// Recorre los píxeles cubiertos por una cápsula de radio `half_width`
/// (un disco si `a == b`) con su cobertura antialiasing.
fn cover_segment(
    width: u32,
    height: u32,
    a: [f64; 2],
    b: [f64; 2],
    half_width: f64,
    visit: &mut impl FnMut(u32, u32, f64),
) {
    let reach = half_width + 1.0;
    let x0 = (a[0].min(b[0]) - reach).floor().max(0.0) as u32;
    let y0 = (a[1].min(b[1]) - reach).floor().max(0.0) as u32;
    let x1 = ((a[0].max(b[0]) + reach).ceil().max(0.0) as u32).min(width.saturating_sub(1));
    let y1 = ((a[1].max(b[1]) + reach).ceil().max(0.0) as u32).min(height.saturating_sub(1));
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let length2 = dx * dx + dy * dy;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
            let t = if length2 > 0.0 {
                (((px - a[0]) * dx + (py - a[1]) * dy) / length2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (cx, cy) = (a[0] + t * dx, a[1] + t * dy);
            let distance = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
            let coverage = (half_width + 0.5 - distance).clamp(0.0, 1.0);
            if coverage > 0.0 {
                visit(x, y, coverage);
            }
        }
    }
}

/// Texto de la etiqueta de un átomo. El carbono sólo se etiqueta si lleva
/// carga, isótopo, número de mapeo o está aislado.
struct AtomLabel {
    text: String,
    /// Caracteres previos al símbolo (isótopo): la etiqueta se centra en él.
    lead: usize,
    symbol_len: usize,
    color: [u8; 3],
}

impl AtomLabel {
    fn for_atom(graph: &MolecularGraph, index: usize) -> Option<Self> {
        let atom = graph.atom(index);
        let plain_carbon = atom.atomic_number == CARBON
            && atom.formal_charge == 0
            && atom.isotope.is_none()
            && atom.map_number.is_none()
            && graph.degree(index) > 0;
        if plain_carbon {
            return None;
        }

        let isotope = atom.isotope.map(|i| i.to_string()).unwrap_or_default();
        let symbol = atom.symbol();
        let mut text = format!("{isotope}{symbol}");
        match atom.hydrogens {
            0 => {}
            1 => text.push('H'),
            n => text.push_str(&format!("H{n}")),
        }
        match atom.formal_charge {
            0 => {}
            1 => text.push('+'),
            -1 => text.push('-'),
            q if q > 0 => text.push_str(&format!("{q}+")),
            q => text.push_str(&format!("{}-", -q)),
        }
        if let Some(map) = atom.map_number {
            text.push_str(&format!(":{map}"));
        }
        Some(Self {
            text,
            lead: isotope.len(),
            symbol_len: symbol.len(),
            color: elements::color(atom.atomic_number),
        })
    }

    fn draw(&self, canvas: &mut Canvas, at: [f64; 2], scale: f64) {
        let advance = ADVANCE * scale;
        let x = at[0] - advance * (self.lead as f64 + self.symbol_len as f64 / 2.0);
        let y = at[1] - GLYPH * scale / 2.0;
        let width = advance * self.text.chars().count() as f64;
        canvas.fill_rect(x - 1.0, y - 1.0, x + width + 1.0, y + GLYPH * scale + 1.0);
        canvas.text([x, y], &self.text, scale, self.color);
    }
}

struct Canvas {
    image: RgbaImage,
    width: u32,
    height: u32,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])),
            width,
            height,
        }
    }

    fn blend(&mut self, x: u32, y: u32, color: [u8; 3], alpha: f64) {
        let pixel = self.image.get_pixel_mut(x, y);
        for (channel, target) in pixel.0.iter_mut().zip(color) {
            let mixed = *channel as f64 * (1.0 - alpha) + target as f64 * alpha;
            *channel = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }

    fn segment(&mut self, a: [f64; 2], b: [f64; 2], half_width: f64, color: [u8; 3]) {
        let mut covered = Vec::new();
        cover_segment(self.width, self.height, a, b, half_width, &mut |x, y, c| {
            covered.push((x, y, c))
        });
        for (x, y, coverage) in covered {
            self.blend(x, y, color, coverage);
        }
    }

    /// Enlace con cada mitad del color de su extremo.
    fn split_segment(
        &mut self,
        a: [f64; 2],
        b: [f64; 2],
        half_width: f64,
        colors: ([u8; 3], [u8; 3]),
    ) {
        if colors.0 == colors.1 {
            self.segment(a, b, half_width, colors.0);
            return;
        }
        let middle = [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0];
        self.segment(a, middle, half_width, colors.0);
        self.segment(middle, b, half_width, colors.1);
    }

    fn fill_rect(&mut self, x0: f64, y0: f64, x1: f64, y1: f64) {
        let (width, height) = (self.width as f64, self.height as f64);
        let clamp_x = |v: f64| v.round().clamp(0.0, width) as u32;
        let clamp_y = |v: f64| v.round().clamp(0.0, height) as u32;
        for y in clamp_y(y0)..clamp_y(y1) {
            for x in clamp_x(x0)..clamp_x(x1) {
                self.image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
    }

    /// Texto con la fuente 8x8; `origin` es la esquina superior izquierda.
    fn text(&mut self, origin: [f64; 2], text: &str, scale: f64, color: [u8; 3]) {
        let size = scale.max(1.0).round() as i64;
        let (ox, oy) = (origin[0].round() as i64, origin[1].round() as i64);
        for (position, ch) in text.chars().enumerate() {
            let Some(glyph) = BASIC_FONTS.get(ch) else {
                continue;
            };
            let left = ox + (position as f64 * ADVANCE * scale).round() as i64;
            for (row, bits) in glyph.iter().enumerate() {
                for column in 0..8 {
                    if bits & (1 << column) == 0 {
                        continue;
                    }
                    for sy in 0..size {
                        for sx in 0..size {
                            let x = left + column * size + sx;
                            let y = oy + row as i64 * size + sy;
                            if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
                                self.blend(x as u32, y as u32, color, 1.0);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Texto centrado en `centre` sobre fondo blanco.
    fn text_box(&mut self, centre: [f64; 2], text: &str, scale: f64, color: [u8; 3]) {
        let width = ADVANCE * scale * text.chars().count() as f64;
        let height = GLYPH * scale;
        let origin = [centre[0] - width / 2.0, centre[1] - height / 2.0];
        self.fill_rect(origin[0] - 1.0, origin[1] - 1.0, origin[0] + width + 1.0, origin[1] + height + 1.0);
        self.text(origin, text, scale, color);
    }

    fn encode(self) -> Result<Vec<u8>, RenderError> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(self.image)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(buffer)
    }
}
