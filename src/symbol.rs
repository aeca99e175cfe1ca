use std::ops::Range;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Where a label was defined.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Symbol {
    pub address: u16,
    /// 1-based source line
    pub line: usize,
}

/// Label name -> address, in definition order.
///
/// Owned by a single assembly run, so repeated assemblies never see each other's labels.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    map: FxMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            map: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Define `name`. On a duplicate, the first definition is kept and returned as the error.
    pub fn insert(&mut self, name: &str, address: u16, line: usize) -> Result<(), Symbol> {
        if let Some(existing) = self.map.get(name) {
            return Err(*existing);
        }
        self.map.insert(name.to_string(), Symbol { address, line });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.map.get(name).map(|symbol| symbol.address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.map.iter().map(|(name, symbol)| (name.as_str(), symbol))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: usize,
    len: usize,
}

impl Span {
    pub fn new(offs: usize, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn offs(&self) -> usize {
        self.offs
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offs + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_definition_order() {
        let mut table = SymbolTable::new();
        table.insert("START", 6, 1).unwrap();
        table.insert("END", 30, 9).unwrap();
        table.insert("LOOP", 10, 4).unwrap();

        let names: Vec<_> = table.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["START", "END", "LOOP"]);
        assert_eq!(table.get("LOOP"), Some(10));
        assert_eq!(table.get("loop"), None);
    }

    #[test]
    fn duplicate_reports_first() {
        let mut table = SymbolTable::new();
        table.insert("A", 1, 2).unwrap();
        assert_eq!(
            table.insert("A", 5, 7),
            Err(Symbol {
                address: 1,
                line: 2
            })
        );
        assert_eq!(table.get("A"), Some(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn span_range() {
        let span = Span::new(4, 3);
        assert_eq!(Range::from(span), 4..7);
        assert!(!span.is_empty());
    }
}
