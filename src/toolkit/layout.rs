//! Coordenadas 2D para el dibujo.
//!
//! Cada fragmento se coloca por geometría de distancias: distancias objetivo
//! derivadas de la topología (enlace = 1, cuerdas de polígono regular dentro
//! de anillos, zigzag ideal para el resto), semilla por MDS clásico y
//! refinamiento por mayorización de estrés. El resultado es determinista.

use std::f64::consts::PI;

use crate::models::MolecularGraph;
use crate::toolkit::topology;

const FRAGMENT_GAP: f64 = 1.5;
const POWER_ITERATIONS: usize = 120;
const STRESS_SWEEPS: usize = 200;
const JITTER: f64 = 1e-3;

pub type Point = [f64; 2];

/// Generador determinista (splitmix64) para semillas y perturbaciones.
struct SplitMix(u64);

impl SplitMix {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }
}

/// Distancia ideal entre dos átomos a `d` enlaces en una cadena en zigzag
/// con ángulos de 120°.
fn zigzag(d: usize) -> f64 {
    let m = (d / 2) as f64;
    if d % 2 == 0 {
        m * 3f64.sqrt()
    } else {
        (3.0 * (m + 0.5).powi(2) + 0.25).sqrt()
    }
}

/// Cuerda entre vértices separados `k` posiciones en un polígono regular de
/// `n` lados con arista 1.
fn ring_chord(k: usize, n: usize) -> f64 {
    (PI * k as f64 / n as f64).sin() / (PI / n as f64).sin()
}

pub fn compute_coordinates(graph: &MolecularGraph) -> Vec<Point> {
    let mut coordinates = vec![[0.0, 0.0]; graph.atom_count()];
    let skeleton = topology::skeleton(graph);
    let mut cursor = 0.0;

    for fragment in topology::fragments(graph) {
        let local = layout_fragment(graph, &skeleton, &fragment);
        let (min_x, max_x) = local
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[0]), hi.max(p[0]))
            });
        let shift = cursor - min_x;
        for (&atom, point) in fragment.iter().zip(&local) {
            coordinates[atom] = [point[0] + shift, point[1]];
        }
        cursor += (max_x - min_x) + FRAGMENT_GAP;
    }

    let (min_x, max_x) = coordinates
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[0]), hi.max(p[0]))
        });
    if min_x.is_finite() {
        let centre = (min_x + max_x) / 2.0;
        for point in &mut coordinates {
            point[0] -= centre;
        }
    }
    coordinates
}

fn layout_fragment(
    graph: &MolecularGraph,
    skeleton: &petgraph::graph::UnGraph<(), usize>,
    fragment: &[usize],
) -> Vec<Point> {
    let n = fragment.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![[0.0, 0.0]],
        2 => return vec![[-0.5, 0.0], [0.5, 0.0]],
        _ => {}
    }

    let targets = target_distances(graph, skeleton, fragment);
    let mut points = classical_mds(&targets, fragment[0] as u64);
    let mut rng = SplitMix(0xA5A5_0000 ^ n as u64);
    for point in &mut points {
        point[0] += JITTER * rng.next();
        point[1] += JITTER * rng.next();
    }
    majorize(&targets, &mut points);
    align_principal_axis(&mut points);
    points
}

/// Matriz de distancias objetivo entre los átomos del fragmento.
fn target_distances(
    graph: &MolecularGraph,
    skeleton: &petgraph::graph::UnGraph<(), usize>,
    fragment: &[usize],
) -> Vec<Vec<f64>> {
    let n = fragment.len();
    let mut local = vec![usize::MAX; graph.atom_count()];
    for (i, &atom) in fragment.iter().enumerate() {
        local[atom] = i;
    }

    let mut targets = vec![vec![0.0; n]; n];
    for (i, &atom) in fragment.iter().enumerate() {
        let hops = topology::topological_distances(skeleton, atom);
        for (j, &other) in fragment.iter().enumerate() {
            if i != j {
                targets[i][j] = zigzag(hops[other].unwrap_or(n));
            }
        }
    }

    // Anillos de mayor a menor: el más pequeño sobrescribe.
    let mut rings: Vec<&Vec<usize>> = graph
        .rings()
        .iter()
        .filter(|ring| ring.iter().all(|&a| local[a] != usize::MAX))
        .collect();
    rings.sort_by_key(|ring| std::cmp::Reverse(ring.len()));
    for ring in rings {
        let size = ring.len();
        for (p, &a) in ring.iter().enumerate() {
            for (q, &b) in ring.iter().enumerate().skip(p + 1) {
                let k = (q - p).min(size - (q - p));
                let chord = ring_chord(k, size);
                targets[local[a]][local[b]] = chord;
                targets[local[b]][local[a]] = chord;
            }
        }
    }

    for bond in graph.bonds() {
        let (a, b) = (local[bond.begin], local[bond.end]);
        if a != usize::MAX && b != usize::MAX {
            targets[a][b] = 1.0;
            targets[b][a] = 1.0;
        }
    }
    targets
}

/// MDS clásico: las dos componentes principales de la matriz de Gram
/// doblemente centrada, obtenidas por iteración de potencia.
fn classical_mds(targets: &[Vec<f64>], seed: u64) -> Vec<Point> {
    let n = targets.len();
    let squared: Vec<Vec<f64>> = targets
        .iter()
        .map(|row| row.iter().map(|d| d * d).collect())
        .collect();
    let row_means: Vec<f64> = squared.iter().map(|r| r.iter().sum::<f64>() / n as f64).collect();
    let grand_mean = row_means.iter().sum::<f64>() / n as f64;

    let mut gram = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            gram[i][j] = -0.5 * (squared[i][j] - row_means[i] - row_means[j] + grand_mean);
        }
    }
    // Desplazamiento de Gershgorin: la iteración converge al mayor autovalor
    // algebraico.
    let shift = gram
        .iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max);

    let mut rng = SplitMix(seed.wrapping_mul(31).wrapping_add(7));
    let mut components: Vec<(f64, Vec<f64>)> = Vec::with_capacity(2);
    for _ in 0..2 {
        let mut v: Vec<f64> = (0..n).map(|_| rng.next()).collect();
        let mut eigenvalue = 0.0;
        for _ in 0..POWER_ITERATIONS {
            for (_, previous) in &components {
                let dot: f64 = v.iter().zip(previous).map(|(a, b)| a * b).sum();
                for (x, p) in v.iter_mut().zip(previous) {
                    *x -= dot * p;
                }
            }
            let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm < 1e-12 {
                break;
            }
            v.iter_mut().for_each(|x| *x /= norm);
            let next: Vec<f64> = (0..n)
                .map(|i| (0..n).map(|j| gram[i][j] * v[j]).sum::<f64>() + shift * v[i])
                .collect();
            eigenvalue = v.iter().zip(&next).map(|(a, b)| a * b).sum::<f64>() - shift;
            v = next;
        }
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt().max(1e-12);
        v.iter_mut().for_each(|x| *x /= norm);
        components.push((eigenvalue, v));
    }

    (0..n)
        .map(|i| {
            [
                components[0].1[i] * components[0].0.max(0.0).sqrt(),
                components[1].1[i] * components[1].0.max(0.0).sqrt(),
            ]
        })
        .collect()
}

/// Mayorización de estrés (Gauss-Seidel) con pesos `1/d²`.
fn majorize(targets: &[Vec<f64>], points: &mut [Point]) {
    let n = points.len();
    for _ in 0..STRESS_SWEEPS {
        for i in 0..n {
            let mut sum = [0.0, 0.0];
            let mut weight_sum = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let d = targets[i][j];
                let w = 1.0 / (d * d);
                let dx = points[i][0] - points[j][0];
                let dy = points[i][1] - points[j][1];
                let current = (dx * dx + dy * dy).sqrt();
                let (ux, uy) = if current > 1e-9 {
                    (dx / current, dy / current)
                } else {
                    (0.0, 0.0)
                };
                sum[0] += w * (points[j][0] + d * ux);
                sum[1] += w * (points[j][1] + d * uy);
                weight_sum += w;
            }
            points[i] = [sum[0] / weight_sum, sum[1] / weight_sum];
        }
    }
}

/// Centra en el origen y gira para que el eje principal quede horizontal.
fn align_principal_axis(points: &mut [Point]) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points.iter_mut() {
        p[0] -= cx;
        p[1] -= cy;
        sxx += p[0] * p[0];
        syy += p[1] * p[1];
        sxy += p[0] * p[1];
    }
    let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let (sin, cos) = (-angle).sin_cos();
    for p in points.iter_mut() {
        *p = [p[0] * cos - p[1] * sin, p[0] * sin + p[1] * cos];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::sanitize::sanitize;
    use crate::toolkit::smiles::parse_smiles;

    fn molecule(smiles: &str) -> MolecularGraph {
        sanitize(parse_smiles(smiles).unwrap()).unwrap()
    }

    fn distance(a: Point, b: Point) -> f64 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }

    #[test]
    fn zigzag_and_chord_distances() {
        assert!((zigzag(1) - 1.0).abs() < 1e-12);
        assert!((zigzag(2) - 3f64.sqrt()).abs() < 1e-12);
        assert!((zigzag(3) - 7f64.sqrt()).abs() < 1e-12);
        assert!((ring_chord(1, 6) - 1.0).abs() < 1e-12);
        assert!((ring_chord(3, 6) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn benzene_is_a_regular_hexagon() {
        let graph = molecule("c1ccccc1");
        let points = compute_coordinates(&graph);
        for bond in graph.bonds() {
            let length = distance(points[bond.begin], points[bond.end]);
            assert!((length - 1.0).abs() < 0.05, "bond length {length}");
        }
        assert!((distance(points[0], points[3]) - 2.0).abs() < 0.05);
    }

    #[test]
    fn substituted_rings_keep_sensible_bond_lengths() {
        let graph = molecule("CC(=O)Nc1ccc(O)cc1");
        let points = compute_coordinates(&graph);
        assert!(points.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
        for bond in graph.bonds() {
            let length = distance(points[bond.begin], points[bond.end]);
            assert!((0.7..1.3).contains(&length), "bond {} length {length}", bond.index);
        }
    }

    #[test]
    fn layout_is_deterministic() {
        let graph = molecule("CC(C)Cc1ccc(cc1)C(C)C(=O)O");
        assert_eq!(compute_coordinates(&graph), compute_coordinates(&graph));
    }

    #[test]
    fn fragments_are_placed_side_by_side() {
        let graph = molecule("CCCC.[Na+]");
        let points = compute_coordinates(&graph);
        let chain_right = points[..4].iter().map(|p| p[0]).fold(f64::MIN, f64::max);
        assert!(points[4][0] >= chain_right + FRAGMENT_GAP - 1e-9);
    }

    #[test]
    fn single_atom_sits_at_the_origin() {
        assert_eq!(compute_coordinates(&molecule("O")), vec![[0.0, 0.0]]);
    }
}
