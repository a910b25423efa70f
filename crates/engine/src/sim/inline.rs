use tracing::debug;

use super::brain::{BrainProgram, Reflex};

const MAX_INLINE_DEPTH: u8 = 4;

/// Tracks the frame inline expansion last ran on so a frame never expands twice.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineGuard {
    last_inline_frame: Option<u64>,
}

impl InlineGuard {
    pub fn last_inline_frame(&self) -> Option<u64> {
        self.last_inline_frame
    }

    /// Returns false without touching anything when `frame` was already expanded.
    pub fn apply<'a>(
        &mut self,
        frame: u64,
        programs: impl IntoIterator<Item = &'a mut BrainProgram>,
    ) -> bool {
        if self.last_inline_frame == Some(frame) {
            return false;
        }
        self.last_inline_frame = Some(frame);

        let mut inserted = 0usize;
        for program in programs {
            inserted += expand_inline_tasks(program);
        }
        debug!(frame, inserted, "inline_tasks_expanded");
        true
    }
}

/// Inserts a copy of each referenced task's authored reflexes right after the inline
/// reflex. Copies are indented one level past the inline reflex. Copies that themselves
/// inline are expanded as the walk reaches them, up to a fixed depth. Copies left by an
/// earlier expansion are dropped first.
pub fn expand_inline_tasks(program: &mut BrainProgram) -> usize {
    for task in &mut program.tasks {
        task.reflexes.retain(|reflex| !reflex.is_inlined_copy());
    }
    let mut inserted = 0usize;
    for task_index in 0..program.tasks.len() {
        let mut reflex_index = 0usize;
        while reflex_index < program.tasks[task_index].reflexes.len() {
            let reflex = &program.tasks[task_index].reflexes[reflex_index];
            let Some(target) = reflex.inline_target() else {
                reflex_index += 1;
                continue;
            };
            if reflex.inline_depth >= MAX_INLINE_DEPTH {
                reflex_index += 1;
                continue;
            }
            let Some(source) = program.task(target) else {
                debug!(task = target.0, "inline_task_missing");
                reflex_index += 1;
                continue;
            };
            let extra_indent = reflex.indentation + 1;
            let depth = reflex.inline_depth + 1;
            let copies = source
                .reflexes
                .iter()
                .filter(|original| !original.is_inlined_copy())
                .map(|original| Reflex {
                    indentation: original.indentation + extra_indent,
                    inline_depth: depth,
                    ..original.clone()
                })
                .collect::<Vec<_>>();
            let count = copies.len();
            let insert_at = reflex_index + 1;
            program.tasks[task_index]
                .reflexes
                .splice(insert_at..insert_at, copies);
            inserted += count;
            reflex_index += 1;
        }
    }
    inserted
}
