use crate::ParseResult;
use std::marker;

/// Common "iterate over n things parsed out of a byte region" pattern
pub struct ParsingIterator<'a, T: StatelessParser> {
    num_remaining: u32,
    remaining: &'a [u8],
    phantom: marker::PhantomData<T>,
}

impl<'a, T: StatelessParser> ParsingIterator<'a, T> {
    pub fn new(remaining: &'a [u8], num_remaining: u32) -> ParsingIterator<'a, T> {
        ParsingIterator {
            num_remaining,
            remaining,
            phantom: marker::PhantomData,
        }
    }
}

impl<'a, T: StatelessParser> Iterator for ParsingIterator<'a, T> {
    type Item = ParseResult<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_remaining == 0 {
            return None;
        }

        let res = T::parse(self.remaining);

        match res {
            Ok((input, val)) => {
                self.remaining = input;
                self.num_remaining -= 1;
                Some(Ok(val))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// A parser whose output is fully determined by its input bytes.
/// Used with `ParsingIterator` to handle the common iterate-and-parse pattern.
pub trait StatelessParser: Sized {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self>;
}
