//! Template input assembly
//!
//! A tagged template arrives as N+1 literal chunks and N embedded
//! expressions. The assembler flattens it into one stream of units where each
//! expression is replaced by a positional marker.

use std::rc::Rc;

use crate::error::IstfError;
use crate::stream::Stream;

/// One element of the assembled template
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    /// Literal character from a chunk
    Char(char),
    /// Placeholder for the expression at this 0-based position
    Interpolation(usize),
}

#[derive(Clone)]
struct Cursor {
    chunks: Rc<[Box<str>]>,
    chunk: usize,
    pos: usize,
}

impl Cursor {
    fn step(self) -> Option<(Unit, Cursor)> {
        let text = self.chunks.get(self.chunk)?;
        if let Some(c) = text[self.pos..].chars().next() {
            let pos = self.pos + c.len_utf8();
            return Some((Unit::Char(c), Cursor { pos, ..self }));
        }
        if self.chunk + 1 < self.chunks.len() {
            let marker = Unit::Interpolation(self.chunk);
            return Some((
                marker,
                Cursor {
                    chunk: self.chunk + 1,
                    pos: 0,
                    ..self
                },
            ));
        }
        None
    }
}

/// Merge chunks and interpolation placeholders into a unit stream
///
/// Produces chunk `i`'s characters followed by `Interpolation(i)` for every
/// `i < N`. The interpolations themselves are only counted; they stay with the
/// caller and are spliced back by ordinal.
pub fn assemble<S, R>(chunks: &[S], interpolations: &[R]) -> Result<Stream<Unit>, IstfError>
where
    S: AsRef<str>,
{
    if chunks.len() != interpolations.len() + 1 {
        return Err(IstfError::ChunkCount {
            chunks: chunks.len(),
            interpolations: interpolations.len(),
        });
    }

    let chunks: Rc<[Box<str>]> = chunks.iter().map(|c| Box::from(c.as_ref())).collect();
    log::trace!("assembling template with {} interpolations", interpolations.len());

    Ok(Stream::unfold(
        Cursor {
            chunks,
            chunk: 0,
            pos: 0,
        },
        Cursor::step,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(chunks: &[&str], n: usize) -> Vec<Unit> {
        let refs = vec![(); n];
        assemble(chunks, &refs).unwrap().iter().collect()
    }

    #[test]
    fn test_markers_between_chunks() {
        let got = units(&["a", "bc", ""], 2);
        assert_eq!(
            got,
            vec![
                Unit::Char('a'),
                Unit::Interpolation(0),
                Unit::Char('b'),
                Unit::Char('c'),
                Unit::Interpolation(1),
            ]
        );
    }

    #[test]
    fn test_adjacent_markers_and_unicode() {
        let got = units(&["é", "", "ß"], 2);
        assert_eq!(
            got,
            vec![
                Unit::Char('é'),
                Unit::Interpolation(0),
                Unit::Interpolation(1),
                Unit::Char('ß'),
            ]
        );
    }

    #[test]
    fn test_plain_chunk() {
        assert_eq!(units(&["ab"], 0), vec![Unit::Char('a'), Unit::Char('b')]);
        assert!(units(&[""], 0).is_empty());
    }

    #[test]
    fn test_chunk_count_mismatch() {
        let err = assemble(&["a", "b"], &[(), ()]).unwrap_err();
        assert_eq!(
            err,
            IstfError::ChunkCount {
                chunks: 2,
                interpolations: 2
            }
        );
        assert!(assemble::<&str, ()>(&[], &[]).is_err());
    }
}
