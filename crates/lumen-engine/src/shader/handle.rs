//! Handle types and bookkeeping shared by the bundled backends.

use std::num::NonZeroU32;

use super::kind::StageKind;

/// Handle to a stage object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StageId(NonZeroU32);

/// Handle to a program object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(NonZeroU32);

/// Index into a linked program's uniform table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniformSlot(u32);

impl UniformSlot {
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(UniformSlot)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Hands out non-zero ids shared by stages and programs, like a classic context.
#[derive(Debug, Default)]
pub(crate) struct HandleAllocator {
    last: u32,
}

impl HandleAllocator {
    fn next(&mut self) -> NonZeroU32 {
        self.last = self.last.wrapping_add(1);
        if self.last == 0 {
            self.last = 1;
        }
        NonZeroU32::new(self.last).unwrap_or(NonZeroU32::MIN)
    }

    pub(crate) fn stage(&mut self) -> StageId {
        StageId(self.next())
    }

    pub(crate) fn program(&mut self) -> ProgramId {
        ProgramId(self.next())
    }
}

/// Picks the single vertex and fragment stage out of a program's attachments.
///
/// `lookup` returns the kind and compile result of a live stage. Fails with a
/// link log line when a stage is missing, duplicated or did not compile.
pub(crate) fn select_stages<'a, T: 'a>(
    attached: &[StageId],
    mut lookup: impl FnMut(StageId) -> Option<(StageKind, Option<&'a Result<T, String>>)>,
) -> Result<(&'a T, &'a T), String> {
    let mut vertex = None;
    let mut fragment = None;

    for &id in attached {
        let Some((kind, compiled)) = lookup(id) else { continue };
        let Some(Ok(compiled)) = compiled else {
            return Err(format!(
                "error: {kind} stage was not successfully compiled before linking"
            ));
        };
        let slot = match kind {
            StageKind::Vertex => &mut vertex,
            StageKind::Fragment => &mut fragment,
        };
        if slot.replace(compiled).is_some() {
            return Err(format!("error: more than one {kind} stage attached"));
        }
    }

    match (vertex, fragment) {
        (Some(v), Some(f)) => Ok((v, f)),
        (None, _) => Err("error: no VERTEX stage attached".to_string()),
        (_, None) => Err("error: no FRAGMENT stage attached".to_string()),
    }
}
