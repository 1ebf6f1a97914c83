//! `proof/goals`: the custom extension request for proof state at a cursor.
//!
//! Real goal rendering is the prover's job; `Prover` doesn't expose it
//! directly (§6 lists no such operation), so this surfaces the diagnostics
//! attached to the covering node as the best approximation this crate can
//! make without widening the prover capability.

use lsp_types::Position;

use crate::document::Document;
use crate::lsp_data::{ls_util, GoalsResult, PpFormat};
use crate::prover::Prover;

pub fn handle<P: Prover>(
    doc: &Document<P>,
    position: Position,
    pp_format: PpFormat,
) -> Option<GoalsResult> {
    let offset = ls_util::position_to_offset(&doc.raw_text, position);
    let node = doc.nodes.iter().find(|n| {
        let (start, end) = ls_util::range_to_byte_span(&doc.raw_text, &n.range);
        start <= offset && offset <= end
    })?;

    let goals = node
        .diagnostics
        .iter()
        .map(|d| match pp_format {
            PpFormat::Str => d.message.clone(),
            PpFormat::Pp => format!("(Pp \"{}\")", d.message),
        })
        .collect();
    Some(GoalsResult { goals })
}
