use crate::model::{AnswerBook, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Info,
    Task(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorFacet {
    pub task_id: u64,
    pub number: u32,
    pub active: bool,
    pub answered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

/// Which slide is visible. Exactly one is at any time; switching never touches
/// the network.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    cursor: Cursor,
    task_count: usize,
}

impl Navigation {
    pub fn new(task_count: usize) -> Self {
        Self {
            cursor: Cursor::Info,
            task_count,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn active_task(&self) -> Option<usize> {
        match self.cursor {
            Cursor::Task(index) => Some(index),
            Cursor::Info => None,
        }
    }

    pub fn show_info(&mut self) {
        self.cursor = Cursor::Info;
    }

    /// Returns false and keeps the current slide when `index` is out of range.
    pub fn show_task(&mut self, index: usize) -> bool {
        if index >= self.task_count {
            return false;
        }
        self.cursor = Cursor::Task(index);
        true
    }

    pub fn next(&mut self) {
        self.cursor = match self.cursor {
            Cursor::Info if self.task_count > 0 => Cursor::Task(0),
            Cursor::Task(index) if index + 1 < self.task_count => Cursor::Task(index + 1),
            other => other,
        };
    }

    pub fn prev(&mut self) {
        self.cursor = match self.cursor {
            Cursor::Task(0) => Cursor::Info,
            Cursor::Task(index) => Cursor::Task(index - 1),
            Cursor::Info => Cursor::Info,
        };
    }

    pub fn selectors(&self, tasks: &[Task], answers: &AnswerBook) -> Vec<SelectorFacet> {
        tasks
            .iter()
            .enumerate()
            .map(|(index, task)| SelectorFacet {
                task_id: task.variant_task_id,
                number: task.number,
                active: self.cursor == Cursor::Task(index),
                answered: answers.is_answered(task),
            })
            .collect()
    }
}

pub fn progress(tasks: &[Task], answers: &AnswerBook) -> Progress {
    Progress {
        answered: tasks.iter().filter(|task| answers.is_answered(task)).count(),
        total: tasks.len(),
    }
}
