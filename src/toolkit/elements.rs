//! Tabla periódica mínima: símbolos, valencias permitidas y colores de dibujo.
//!
//! El número atómico 0 se reserva para el comodín `*` de SMILES.

/// Símbolos indexados por número atómico (0 = comodín).
const SYMBOLS: [&str; 104] = [
    "*", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm",
    "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr",
];

pub const HYDROGEN: u8 = 1;
pub const CARBON: u8 = 6;
pub const NITROGEN: u8 = 7;
pub const OXYGEN: u8 = 8;

/// Símbolo del elemento; `"?"` si el número atómico no está en la tabla.
pub fn symbol(atomic_number: u8) -> &'static str {
    SYMBOLS.get(atomic_number as usize).copied().unwrap_or("?")
}

/// Busca el número atómico a partir del símbolo exacto (`"Cl"`, `"Se"`...).
pub fn atomic_number(symbol: &str) -> Option<u8> {
    SYMBOLS
        .iter()
        .position(|s| *s == symbol)
        .map(|z| z as u8)
}

/// Valencias permitidas para el elemento neutro. Un slice vacío significa
/// "sin restricción" (metales de transición, lantánidos, comodín).
fn neutral_valences(atomic_number: u8) -> &'static [u8] {
    match atomic_number {
        1 | 3 | 9 | 11 | 17 | 19 | 35 | 37 | 55 => &[1],
        4 | 8 | 12 | 20 | 38 | 56 => &[2],
        5 | 13 | 31 | 49 => &[3],
        6 | 14 | 32 => &[4],
        7 => &[3],
        15 | 33 | 51 => &[3, 5, 7],
        16 | 34 | 52 | 84 => &[2, 4, 6],
        53 => &[1, 3, 5],
        50 | 82 => &[2, 4],
        81 => &[1, 3],
        83 => &[3, 5],
        85 => &[1, 3, 5, 7],
        54 => &[0, 2, 4, 6],
        2 | 10 | 18 | 36 | 86 => &[0],
        _ => &[],
    }
}

/// Valencias permitidas teniendo en cuenta la carga formal.
///
/// Los átomos cargados de los grupos principales se tratan como su
/// isoelectrónico (N⁺ como C, O⁻ como F, Na⁺ como Ne...).
pub fn allowed_valences(atomic_number: u8, formal_charge: i8) -> &'static [u8] {
    let neutral = neutral_valences(atomic_number);
    if formal_charge == 0 || neutral.is_empty() {
        return neutral;
    }
    if atomic_number == HYDROGEN {
        return &[0];
    }
    let shifted = atomic_number as i16 - formal_charge as i16;
    if !(1..=86).contains(&shifted) {
        return &[];
    }
    neutral_valences(shifted as u8)
}

/// Color RGB usado para etiquetas y enlaces de cada elemento.
pub fn color(atomic_number: u8) -> [u8; 3] {
    match atomic_number {
        0 => [128, 128, 128],
        1 => [140, 140, 140],
        7 => [51, 51, 255],
        8 => [255, 0, 0],
        9 => [51, 204, 204],
        15 => [255, 128, 0],
        16 => [204, 204, 0],
        17 => [0, 204, 0],
        35 => [128, 77, 26],
        53 => [161, 31, 240],
        _ => [0, 0, 0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_roundtrip_for_common_elements() {
        for (sym, z) in [("C", 6), ("Cl", 17), ("Fe", 26), ("I", 53), ("Au", 79), ("Lr", 103)] {
            assert_eq!(atomic_number(sym), Some(z));
            assert_eq!(symbol(z), sym);
        }
        assert_eq!(atomic_number("Xx"), None);
        assert_eq!(symbol(200), "?");
    }

    #[test]
    fn charged_atoms_use_isoelectronic_valences() {
        assert_eq!(allowed_valences(7, 1), &[4]);
        assert_eq!(allowed_valences(8, -1), &[1]);
        assert_eq!(allowed_valences(6, -1), &[3]);
        assert_eq!(allowed_valences(11, 1), &[0]);
        assert!(allowed_valences(26, 2).is_empty());
    }
}
