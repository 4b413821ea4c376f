//! Lazy traversal of a task tree into `(path, document)` pairs.

use std::iter::Enumerate;
use std::vec::IntoIter;

use anyhow::Result;
use tracing::info;

use crate::io::render::{DocumentRenderer, OutputDocument};
use crate::io::store::{ExtendedAnswer, Store, TaskId};

/// Walk `task` and every module sub-task reachable through its answers.
///
/// A task's own documents come first (keyed by document id, or by position
/// when the document has none), then each module answer's sub-task in
/// question order under `path + [question key]`. Tasks are rendered only
/// when the walk reaches them. The iterator stops after the first error.
pub fn generate_task_outputs<'a, S: Store, R: DocumentRenderer>(
    store: &'a S,
    renderer: &'a R,
    path: Vec<String>,
    task: TaskId,
) -> TaskOutputs<'a, S, R> {
    TaskOutputs {
        store,
        renderer,
        start: Some((path, task)),
        stack: Vec::new(),
    }
}

pub struct TaskOutputs<'a, S, R> {
    store: &'a S,
    renderer: &'a R,
    start: Option<(Vec<String>, TaskId)>,
    stack: Vec<Frame>,
}

struct Frame {
    path: Vec<String>,
    documents: Enumerate<IntoIter<OutputDocument>>,
    subtasks: IntoIter<(String, TaskId)>,
}

impl<S: Store, R: DocumentRenderer> TaskOutputs<'_, S, R> {
    fn open(&self, path: Vec<String>, task: TaskId) -> Result<Frame> {
        let label = if path.is_empty() {
            "top-level app".to_string()
        } else {
            path.join(" ")
        };
        info!(path = %label, "generating documents");

        let documents = self.renderer.render(self.store, task)?;
        let subtasks: Vec<(String, TaskId)> = self
            .store
            .answers(task)?
            .into_iter()
            .filter_map(|(key, answer)| match answer {
                ExtendedAnswer::Module { task: Some(sub) } => Some((key, sub)),
                _ => None,
            })
            .collect();
        Ok(Frame {
            path,
            documents: documents.into_iter().enumerate(),
            subtasks: subtasks.into_iter(),
        })
    }

    /// Open `task` onto the stack. Returns the error to yield if rendering failed.
    fn push(
        &mut self,
        path: Vec<String>,
        task: TaskId,
    ) -> Option<Result<(Vec<String>, OutputDocument)>> {
        match self.open(path, task) {
            Ok(frame) => {
                self.stack.push(frame);
                None
            }
            Err(err) => {
                self.stack.clear();
                Some(Err(err))
            }
        }
    }
}

impl<S: Store, R: DocumentRenderer> Iterator for TaskOutputs<'_, S, R> {
    type Item = Result<(Vec<String>, OutputDocument)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((path, task)) = self.start.take()
            && let Some(err) = self.push(path, task)
        {
            return Some(err);
        }

        loop {
            let frame = self.stack.last_mut()?;
            if let Some((i, document)) = frame.documents.next() {
                let key = document.id.clone().unwrap_or_else(|| i.to_string());
                let mut path = frame.path.clone();
                path.push(key);
                return Some(Ok((path, document)));
            }
            if let Some((key, sub)) = frame.subtasks.next() {
                let mut path = frame.path.clone();
                path.push(key);
                if let Some(err) = self.push(path, sub) {
                    return Some(err);
                }
                continue;
            }
            self.stack.pop();
        }
    }
}
