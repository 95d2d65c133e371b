use crate::context::Context;
use crate::error::Error;
use crate::plum::{Plum8, Quirks};

/// One-shot machine construction
///
/// A machine cannot exist without its context, so the context is taken
/// up front; program and quirks are optional.
pub struct Builder<'a, C: Context> {
    ctx: C,
    program: Option<&'a [u8]>,
    quirks: Quirks,
}

impl<'a, C: Context> Builder<'a, C> {
    pub fn new(ctx: C) -> Self {
        Self {
            ctx,
            program: None,
            quirks: Quirks::default(),
        }
    }

    pub fn with_program(mut self, prog: &'a [u8]) -> Self {
        self.program = Some(prog);
        self
    }

    pub fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn build(self) -> Result<Plum8<C>, Error> {
        let mut chip = Plum8::new(self.ctx).with_quirks(self.quirks);
        if let Some(prog) = self.program {
            chip.load_program(prog)?;
        }
        Ok(chip)
    }
}
