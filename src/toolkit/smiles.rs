//! Lectura de SMILES a un [`MolecularGraph`] sin sanitizar.
//!
//! El parser sólo entiende la sintaxis; la validez química (anillos,
//! aromaticidad, valencias) la comprueba después [`super::sanitize`].

use std::collections::BTreeMap;

use crate::models::{BondDirection, BondOrder, Chirality, MolecularGraph, Neighbor, StereoTag};
use crate::toolkit::elements;
use crate::toolkit::error::{ParseFailure, SyntaxError};

/// Resultado del parser: el grafo más los enlaces entre átomos aromáticos
/// escritos sin símbolo, que sólo son aromáticos si acaban en un anillo.
#[derive(Debug, Clone)]
pub struct ParsedSmiles {
    pub graph: MolecularGraph,
    pub implicit_aromatic_bonds: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BondSymbol {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy)]
struct RingOpening {
    atom: usize,
    bond: Option<BondSymbol>,
    /// Posición reservada en el orden de vecinos del átomo que abre.
    slot: usize,
    position: usize,
}

const UNRESOLVED: usize = usize::MAX;

/// Parsea una cadena SMILES. La cadena vacía produce un grafo vacío.
pub fn parse_smiles(input: &str) -> Result<ParsedSmiles, ParseFailure> {
    SmilesParser::new(input).parse()
}

struct SmilesParser<'a> {
    input: &'a [u8],
    pos: usize,
    graph: MolecularGraph,
    neighbor_order: Vec<Vec<Neighbor>>,
    chirality: Vec<Option<Chirality>>,
    rings: BTreeMap<u32, RingOpening>,
    implicit_aromatic: Vec<usize>,
}

impl<'a> SmilesParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            graph: MolecularGraph::new(),
            neighbor_order: Vec::new(),
            chirality: Vec::new(),
            rings: BTreeMap::new(),
            implicit_aromatic: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn error(&self, kind: SyntaxError) -> ParseFailure {
        ParseFailure::syntax(self.pos, kind)
    }

    fn parse(mut self) -> Result<ParsedSmiles, ParseFailure> {
        let mut prev: Option<usize> = None;
        let mut branches: Vec<(usize, usize)> = Vec::new();
        let mut pending: Option<BondSymbol> = None;
        let mut after_open = false;

        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                b'(' => {
                    let atom = prev.ok_or_else(|| self.error(SyntaxError::ExpectedAtom))?;
                    if pending.is_some() || after_open {
                        return Err(self.error(SyntaxError::UnexpectedCharacter('(')));
                    }
                    branches.push((atom, start));
                    self.pos += 1;
                    after_open = true;
                }
                b')' => {
                    if after_open {
                        return Err(self.error(SyntaxError::EmptyBranch));
                    }
                    if pending.is_some() {
                        return Err(self.error(SyntaxError::DanglingBond));
                    }
                    let (atom, _) = branches
                        .pop()
                        .ok_or_else(|| self.error(SyntaxError::UnbalancedParenthesis))?;
                    prev = Some(atom);
                    self.pos += 1;
                }
                b'.' => {
                    if pending.is_some() {
                        return Err(self.error(SyntaxError::DanglingBond));
                    }
                    prev = None;
                    after_open = false;
                    self.pos += 1;
                }
                b'-' | b'=' | b'#' | b'$' | b':' | b'/' | b'\\' => {
                    if pending.is_some() || prev.is_none() {
                        return Err(self.error(SyntaxError::DanglingBond));
                    }
                    pending = Some(match c {
                        b'-' => BondSymbol::Single,
                        b'=' => BondSymbol::Double,
                        b'#' => BondSymbol::Triple,
                        b'$' => BondSymbol::Quadruple,
                        b':' => BondSymbol::Aromatic,
                        b'/' => BondSymbol::Up,
                        _ => BondSymbol::Down,
                    });
                    after_open = false;
                    self.pos += 1;
                }
                b'0'..=b'9' | b'%' => {
                    let atom = prev.ok_or_else(|| self.error(SyntaxError::ExpectedAtom))?;
                    let number = self.ring_number()?;
                    self.ring_bond(atom, number, pending.take(), start)?;
                    after_open = false;
                }
                _ => {
                    let atom = self.atom()?;
                    if let Some(previous) = prev {
                        self.connect(previous, atom, pending.take(), previous)
                            .map_err(|kind| ParseFailure::syntax(start, kind))?;
                    }
                    if self.graph.atom(atom).bracket && self.graph.atom(atom).hydrogens > 0 {
                        self.neighbor_order[atom].push(Neighbor::Hydrogen);
                    } else if self.chirality[atom].is_some() {
                        self.neighbor_order[atom].push(Neighbor::LonePair);
                    }
                    prev = Some(atom);
                    after_open = false;
                }
            }
        }

        if pending.is_some() {
            return Err(self.error(SyntaxError::DanglingBond));
        }
        if let Some(&(_, position)) = branches.last() {
            return Err(ParseFailure::syntax(position, SyntaxError::UnbalancedParenthesis));
        }
        if let Some((&number, opening)) = self.rings.iter().next() {
            return Err(ParseFailure::syntax(
                opening.position,
                SyntaxError::UnclosedRing(number),
            ));
        }

        for (index, chirality) in self.chirality.iter().enumerate() {
            if let Some(chirality) = chirality {
                let mut neighbors = self.neighbor_order[index].clone();
                // Con cuatro vecinos reales no queda sitio para un par libre.
                if neighbors.len() > 4 {
                    neighbors.retain(|n| *n != Neighbor::LonePair);
                }
                self.graph.atoms_mut()[index].stereo = Some(StereoTag {
                    chirality: *chirality,
                    neighbors,
                });
            }
        }

        Ok(ParsedSmiles {
            graph: self.graph,
            implicit_aromatic_bonds: self.implicit_aromatic,
        })
    }

    fn new_atom(&mut self, atomic_number: u8, aromatic: bool) -> usize {
        let index = self.graph.add_atom(atomic_number);
        self.graph.atoms_mut()[index].aromatic = aromatic;
        self.neighbor_order.push(Vec::new());
        self.chirality.push(None);
        index
    }

    /// Crea el enlace `a`–`b`. `from` es el átomo junto al que se escribió
    /// el símbolo (importa para `/` y `\`).
    fn connect(
        &mut self,
        a: usize,
        b: usize,
        symbol: Option<BondSymbol>,
        from: usize,
    ) -> Result<usize, SyntaxError> {
        let both_aromatic = self.graph.atom(a).aromatic && self.graph.atom(b).aromatic;
        let order = match symbol {
            Some(BondSymbol::Double) => BondOrder::Double,
            Some(BondSymbol::Triple) => BondOrder::Triple,
            Some(BondSymbol::Quadruple) => BondOrder::Quadruple,
            _ => BondOrder::Single,
        };
        let bond = self
            .graph
            .add_bond(a, b, order)
            .ok_or(SyntaxError::DuplicateBond)?;

        let edge = self.graph.bond_mut(bond);
        match symbol {
            None if both_aromatic => {
                edge.aromatic = true;
                self.implicit_aromatic.push(bond);
            }
            Some(BondSymbol::Aromatic) => edge.aromatic = true,
            Some(BondSymbol::Up) => edge.direction = Some((from, BondDirection::Up)),
            Some(BondSymbol::Down) => edge.direction = Some((from, BondDirection::Down)),
            _ => {}
        }

        self.neighbor_order[a].push(Neighbor::Atom(b));
        self.neighbor_order[b].push(Neighbor::Atom(a));
        Ok(bond)
    }

    fn ring_number(&mut self) -> Result<u32, ParseFailure> {
        match self.peek() {
            Some(d @ b'0'..=b'9') => {
                self.pos += 1;
                Ok((d - b'0') as u32)
            }
            Some(b'%') => {
                self.pos += 1;
                if self.peek() == Some(b'(') {
                    self.pos += 1;
                    let number = self
                        .number()?
                        .ok_or_else(|| self.error(SyntaxError::InvalidNumber))?;
                    if self.peek() != Some(b')') {
                        return Err(self.error(SyntaxError::UnbalancedParenthesis));
                    }
                    self.pos += 1;
                    Ok(number)
                } else {
                    match (self.peek(), self.peek_at(1)) {
                        (Some(a @ b'0'..=b'9'), Some(b @ b'0'..=b'9')) => {
                            self.pos += 2;
                            Ok(((a - b'0') * 10 + (b - b'0')) as u32)
                        }
                        _ => Err(self.error(SyntaxError::InvalidNumber)),
                    }
                }
            }
            _ => Err(self.error(SyntaxError::InvalidNumber)),
        }
    }

    fn ring_bond(
        &mut self,
        atom: usize,
        number: u32,
        symbol: Option<BondSymbol>,
        position: usize,
    ) -> Result<(), ParseFailure> {
        let Some(opening) = self.rings.remove(&number) else {
            let slot = self.neighbor_order[atom].len();
            self.neighbor_order[atom].push(Neighbor::Atom(UNRESOLVED));
            self.rings.insert(
                number,
                RingOpening {
                    atom,
                    bond: symbol,
                    slot,
                    position,
                },
            );
            return Ok(());
        };

        if opening.atom == atom {
            return Err(ParseFailure::syntax(position, SyntaxError::RingBondToSelf(number)));
        }

        let directional = |s: BondSymbol| matches!(s, BondSymbol::Up | BondSymbol::Down);
        let (symbol, from) = match (opening.bond, symbol) {
            (Some(open), Some(close)) if open != close && !directional(open) && !directional(close) => {
                return Err(ParseFailure::syntax(
                    position,
                    SyntaxError::ConflictingRingBond(number),
                ));
            }
            (_, Some(close)) => (Some(close), atom),
            (Some(open), None) => (Some(open), opening.atom),
            (None, None) => (None, atom),
        };

        let bond = self
            .graph
            .add_bond(opening.atom, atom, BondOrder::Single)
            .ok_or_else(|| ParseFailure::syntax(position, SyntaxError::DuplicateBond))?;
        let both_aromatic =
            self.graph.atom(opening.atom).aromatic && self.graph.atom(atom).aromatic;
        let edge = self.graph.bond_mut(bond);
        match symbol {
            Some(BondSymbol::Double) => edge.order = BondOrder::Double,
            Some(BondSymbol::Triple) => edge.order = BondOrder::Triple,
            Some(BondSymbol::Quadruple) => edge.order = BondOrder::Quadruple,
            Some(BondSymbol::Aromatic) => edge.aromatic = true,
            Some(BondSymbol::Up) => edge.direction = Some((from, BondDirection::Up)),
            Some(BondSymbol::Down) => edge.direction = Some((from, BondDirection::Down)),
            Some(BondSymbol::Single) => {}
            None => {
                if both_aromatic {
                    edge.aromatic = true;
                    self.implicit_aromatic.push(bond);
                }
            }
        }

        self.neighbor_order[opening.atom][opening.slot] = Neighbor::Atom(atom);
        self.neighbor_order[atom].push(Neighbor::Atom(opening.atom));
        Ok(())
    }

    fn atom(&mut self) -> Result<usize, ParseFailure> {
        let c = self
            .peek()
            .ok_or_else(|| self.error(SyntaxError::ExpectedAtom))?;
        let (atomic_number, aromatic, width) = match c {
            b'[' => return self.bracket_atom(),
            b'*' => (0, false, 1),
            b'B' if self.peek_at(1) == Some(b'r') => (35, false, 2),
            b'C' if self.peek_at(1) == Some(b'l') => (17, false, 2),
            b'B' => (5, false, 1),
            b'C' => (6, false, 1),
            b'N' => (7, false, 1),
            b'O' => (8, false, 1),
            b'P' => (15, false, 1),
            b'S' => (16, false, 1),
            b'F' => (9, false, 1),
            b'I' => (53, false, 1),
            b'b' => (5, true, 1),
            b'c' => (6, true, 1),
            b'n' => (7, true, 1),
            b'o' => (8, true, 1),
            b'p' => (15, true, 1),
            b's' => (16, true, 1),
            other => return Err(self.error(SyntaxError::UnexpectedCharacter(other as char))),
        };
        self.pos += width;
        Ok(self.new_atom(atomic_number, aromatic))
    }

    fn bracket_atom(&mut self) -> Result<usize, ParseFailure> {
        self.pos += 1;
        let isotope = match self.number()? {
            Some(n) => Some(u16::try_from(n).map_err(|_| self.error(SyntaxError::InvalidNumber))?),
            None => None,
        };

        let (atomic_number, aromatic) = self.bracket_symbol()?;
        let atom = self.new_atom(atomic_number, aromatic);

        if self.peek() == Some(b'@') {
            self.pos += 1;
            let mut chirality = if self.peek() == Some(b'@') {
                self.pos += 1;
                Some(Chirality::Clockwise)
            } else {
                Some(Chirality::CounterClockwise)
            };
            // Clases explícitas: sólo @TH1/@TH2 equivalen a @/@@.
            if matches!(self.peek(), Some(b'A'..=b'Z')) && self.peek() != Some(b'H') {
                let class_start = self.pos;
                while matches!(self.peek(), Some(b'A'..=b'Z')) {
                    self.pos += 1;
                }
                let input = self.input;
                let class = &input[class_start..self.pos];
                let number = self.number()?;
                chirality = match (class, number) {
                    (b"TH", Some(1)) => Some(Chirality::CounterClockwise),
                    (b"TH", Some(2)) => Some(Chirality::Clockwise),
                    _ => None,
                };
            }
            self.chirality[atom] = chirality;
        }

        let mut hydrogens = 0u8;
        if self.peek() == Some(b'H') {
            self.pos += 1;
            hydrogens = match self.number()? {
                Some(n) => u8::try_from(n).map_err(|_| self.error(SyntaxError::InvalidNumber))?,
                None => 1,
            };
        }

        let mut charge = 0i8;
        if let Some(sign @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let magnitude = match self.number()? {
                Some(n) => n,
                None => {
                    let mut count = 1;
                    while self.peek() == Some(sign) {
                        self.pos += 1;
                        count += 1;
                    }
                    count
                }
            };
            let magnitude =
                i8::try_from(magnitude).map_err(|_| self.error(SyntaxError::InvalidNumber))?;
            charge = if sign == b'+' { magnitude } else { -magnitude };
        }

        let mut map_number = None;
        if self.peek() == Some(b':') {
            self.pos += 1;
            map_number = Some(
                self.number()?
                    .ok_or_else(|| self.error(SyntaxError::InvalidNumber))?,
            );
        }

        if self.peek() != Some(b']') {
            return Err(self.error(SyntaxError::ExpectedClosingBracket));
        }
        self.pos += 1;

        let entry = &mut self.graph.atoms_mut()[atom];
        entry.isotope = isotope;
        entry.hydrogens = hydrogens;
        entry.formal_charge = charge;
        entry.bracket = true;
        entry.map_number = map_number;
        Ok(atom)
    }

    fn bracket_symbol(&mut self) -> Result<(u8, bool), ParseFailure> {
        let c = self
            .peek()
            .ok_or_else(|| self.error(SyntaxError::ExpectedAtom))?;
        if c == b'*' {
            self.pos += 1;
            return Ok((0, false));
        }
        if c.is_ascii_lowercase() {
            let two = [Some(c), self.peek_at(1)];
            for (symbol, z) in [(*b"se", 34u8), (*b"as", 33), (*b"te", 52)] {
                if two == [Some(symbol[0]), Some(symbol[1])] {
                    self.pos += 2;
                    return Ok((z, true));
                }
            }
            let z = match c {
                b'b' => 5,
                b'c' => 6,
                b'n' => 7,
                b'o' => 8,
                b'p' => 15,
                b's' => 16,
                other => {
                    return Err(self.error(SyntaxError::UnknownElement((other as char).to_string())))
                }
            };
            self.pos += 1;
            return Ok((z, true));
        }
        if !c.is_ascii_uppercase() {
            return Err(self.error(SyntaxError::ExpectedAtom));
        }

        if let Some(next) = self.peek_at(1).filter(u8::is_ascii_lowercase) {
            let symbol = [c as char, next as char].iter().collect::<String>();
            if let Some(z) = elements::atomic_number(&symbol) {
                self.pos += 2;
                return Ok((z, false));
            }
        }
        let symbol = (c as char).to_string();
        match elements::atomic_number(&symbol) {
            Some(z) if z > 0 => {
                self.pos += 1;
                Ok((z, false))
            }
            _ => Err(self.error(SyntaxError::UnknownElement(symbol))),
        }
    }

    /// Lee un entero decimal; `None` si no hay dígitos.
    fn number(&mut self) -> Result<Option<u32>, ParseFailure> {
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(d @ b'0'..=b'9') = self.peek() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((d - b'0') as u32))
                .ok_or_else(|| ParseFailure::syntax(start, SyntaxError::InvalidNumber))?;
            self.pos += 1;
        }
        Ok((self.pos > start).then_some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> MolecularGraph {
        parse_smiles(input).expect("valid SMILES").graph
    }

    fn syntax_kind(input: &str) -> SyntaxError {
        match parse_smiles(input) {
            Err(ParseFailure::Syntax { kind, .. }) => kind,
            other => panic!("expected a syntax error for {input}, got {other:?}"),
        }
    }

    #[test]
    fn reads_chain_branches_and_two_letter_symbols() {
        let graph = parse("CC(=O)Cl");
        let symbols: Vec<&str> = graph.atoms().iter().map(|a| a.symbol()).collect();
        assert_eq!(symbols, vec!["C", "C", "O", "Cl"]);
        assert_eq!(graph.bond_count(), 3);
        let carbonyl = graph.bond_between(1, 2).unwrap();
        assert_eq!(graph.bond(carbonyl).order, BondOrder::Double);
        assert!(graph.bond_between(1, 3).is_some());
    }

    #[test]
    fn ring_closures_connect_first_and_last_atom() {
        let parsed = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(parsed.graph.atom_count(), 6);
        assert_eq!(parsed.graph.bond_count(), 6);
        assert!(parsed.graph.bond_between(0, 5).is_some());
        assert_eq!(parsed.implicit_aromatic_bonds.len(), 6);
        assert!(parsed.graph.atoms().iter().all(|a| a.aromatic));
    }

    #[test]
    fn reads_bracket_atoms() {
        let graph = parse("[13CH3][NH3+].[O-2].[Fe+3].[2H]:[se]");
        let carbon = graph.atom(0);
        assert_eq!(carbon.isotope, Some(13));
        assert_eq!(carbon.hydrogens, 3);
        assert!(carbon.bracket);
        assert_eq!(graph.atom(1).formal_charge, 1);
        assert_eq!(graph.atom(2).formal_charge, -2);
        assert_eq!(graph.atom(3).symbol(), "Fe");
        assert_eq!(graph.atom(3).formal_charge, 3);
        assert_eq!(graph.atom(5).symbol(), "Se");
        assert!(graph.atom(5).aromatic);
    }

    #[test]
    fn reads_map_numbers_and_repeated_signs() {
        let graph = parse("[CH2:7][O--]");
        assert_eq!(graph.atom(0).map_number, Some(7));
        assert_eq!(graph.atom(1).formal_charge, -2);
    }

    #[test]
    fn records_chiral_neighbor_order() {
        let graph = parse("N[C@@H](C)C(=O)O");
        let tag = graph.atom(1).stereo.clone().expect("chiral tag");
        assert_eq!(tag.chirality, Chirality::Clockwise);
        assert_eq!(
            tag.neighbors,
            vec![
                Neighbor::Atom(0),
                Neighbor::Hydrogen,
                Neighbor::Atom(2),
                Neighbor::Atom(3)
            ]
        );
    }

    #[test]
    fn ring_closure_keeps_its_position_in_neighbor_order() {
        let graph = parse("[C@]1(F)(Cl)CCC1");
        let tag = graph.atom(0).stereo.clone().unwrap();
        assert_eq!(
            tag.neighbors,
            vec![
                Neighbor::Atom(5),
                Neighbor::Atom(1),
                Neighbor::Atom(2),
                Neighbor::Atom(3)
            ]
        );
    }

    #[test]
    fn three_connected_centers_keep_a_lone_pair_slot() {
        let graph = parse("C[S@@](=O)c1ccccc1");
        let tag = graph.atom(1).stereo.clone().unwrap();
        assert_eq!(
            tag.neighbors,
            vec![
                Neighbor::Atom(0),
                Neighbor::LonePair,
                Neighbor::Atom(2),
                Neighbor::Atom(3)
            ]
        );
    }

    #[test]
    fn directional_bonds_remember_where_they_were_written() {
        let graph = parse("F/C=C\\F");
        assert_eq!(graph.bond(0).direction, Some((0, BondDirection::Up)));
        assert_eq!(graph.bond(2).direction, Some((2, BondDirection::Down)));
    }

    #[test]
    fn empty_input_is_an_empty_graph() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn reports_syntax_errors() {
        assert_eq!(syntax_kind("C(C"), SyntaxError::UnbalancedParenthesis);
        assert_eq!(syntax_kind("CC)"), SyntaxError::UnbalancedParenthesis);
        assert_eq!(syntax_kind("C1CC"), SyntaxError::UnclosedRing(1));
        assert_eq!(syntax_kind("C11"), SyntaxError::RingBondToSelf(1));
        assert_eq!(syntax_kind("C12CC12"), SyntaxError::DuplicateBond);
        assert_eq!(syntax_kind("CC="), SyntaxError::DanglingBond);
        assert_eq!(syntax_kind("C()C"), SyntaxError::EmptyBranch);
        assert_eq!(syntax_kind("[Xx]"), SyntaxError::UnknownElement("X".into()));
        assert_eq!(syntax_kind("[CH4"), SyntaxError::ExpectedClosingBracket);
        assert_eq!(syntax_kind("C?C"), SyntaxError::UnexpectedCharacter('?'));
        assert_eq!(syntax_kind("C=1CC-1"), SyntaxError::ConflictingRingBond(1));
    }
}
