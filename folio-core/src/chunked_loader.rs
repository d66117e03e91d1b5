//! Incremental processing of a sequence, one chunk per scheduling step.
//!
//! A [`ChunkedLoader`] never drives itself: the host calls [`ChunkedLoader::advance`]
//! from whatever scheduler it has (an idle callback, a timer tick, or a plain loop in
//! tests), and each call processes at most one chunk before returning. Everything
//! between two calls belongs to the host.
//!
//! Runs are cancelled through a [`GenerationCounter`]: a loader captures the generation
//! that was current when it was created and stops doing work as soon as the counter
//! moves on. Effects already applied by earlier chunks stay applied.
use std::{cell::Cell, iter::Peekable, rc::Rc};

use crate::TransformFailure;

/// What happened during a call to [`ChunkedLoader::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// There is more to do; call `advance` again.
    Continue,
    /// The run finished; `on_finish` has been called.
    Done,
    /// The run was superseded and did nothing.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}
impl Progress {
    /// `processed / total`, or `1.0` for an empty run.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f32 / self.total as f32
        }
    }
}

/// Monotonically increasing tag shared between the owner of some target and the runs
/// working on it.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Rc<Cell<u64>>);
impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.get()
    }

    /// Invalidates every outstanding token and returns a token for the new generation.
    pub fn advance(&self) -> GenerationToken {
        self.0.set(self.0.get() + 1);
        self.token()
    }

    /// A token for the current generation.
    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            counter: self.0.clone(),
            captured: self.0.get(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationToken {
    counter: Rc<Cell<u64>>,
    captured: u64,
}
impl GenerationToken {
    pub fn generation(&self) -> u64 {
        self.captured
    }

    pub fn is_current(&self) -> bool {
        self.counter.get() == self.captured
    }
}

/// The callbacks of a chunked run over elements of type `T` accumulating into `S`.
pub trait ChunkProcessor<T, S> {
    /// Processes one element. An `Err` is reported through [`ChunkProcessor::on_error`]
    /// and the run carries on with the next element.
    fn process(&mut self, element: T, state: &mut S) -> Result<(), String>;

    /// Called once after every chunk that processed at least one element.
    fn after_chunk(&mut self, _state: &S, _progress: Progress) {}

    fn on_error(&mut self, failure: TransformFailure) {
        tracing::warn!("Skipping {failure}");
    }

    /// Called exactly once, after the last element, even if there were no elements.
    fn on_finish(&mut self, state: S);
}

pub struct ChunkedLoader<I: Iterator, S> {
    elements: Peekable<I>,
    processed: usize,
    total: usize,
    chunk_size: usize,
    state: Option<S>,
    token: GenerationToken,
}
impl<I: ExactSizeIterator, S> ChunkedLoader<I, S> {
    /// Creates a run over `elements`. A `chunk_size` of zero is treated as one.
    pub fn new(
        elements: impl IntoIterator<IntoIter = I>,
        chunk_size: usize,
        state: S,
        token: GenerationToken,
    ) -> Self {
        let elements = elements.into_iter();
        Self {
            total: elements.len(),
            elements: elements.peekable(),
            processed: 0,
            chunk_size: chunk_size.max(1),
            state: Some(state),
            token,
        }
    }
}
impl<I: Iterator, S> ChunkedLoader<I, S> {
    /// Processes the next chunk.
    pub fn advance<P: ChunkProcessor<I::Item, S>>(&mut self, processor: &mut P) -> Step {
        if !self.token.is_current() {
            return Step::Cancelled;
        }
        let Some(state) = self.state.as_mut() else {
            return Step::Done;
        };

        let mut in_chunk = 0;
        while in_chunk < self.chunk_size {
            let Some(element) = self.elements.next() else {
                break;
            };
            let index = self.processed;
            self.processed += 1;
            in_chunk += 1;
            if let Err(reason) = processor.process(element, state) {
                processor.on_error(TransformFailure::new(index, reason));
            }
        }

        let exhausted = self.elements.peek().is_none();
        if exhausted {
            // Trust what was actually seen over the length reported up front.
            self.total = self.processed;
        }
        if in_chunk > 0 {
            let progress = Progress {
                processed: self.processed,
                total: self.total,
            };
            processor.after_chunk(state, progress);
        }

        if exhausted {
            if let Some(state) = self.state.take() {
                processor.on_finish(state);
            }
            return Step::Done;
        }
        Step::Continue
    }

    /// Calls [`ChunkedLoader::advance`] until the run is done or cancelled.
    pub fn run_to_completion<P: ChunkProcessor<I::Item, S>>(&mut self, processor: &mut P) -> Step {
        loop {
            match self.advance(processor) {
                Step::Continue => continue,
                step => return step,
            }
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed: self.processed,
            total: self.total,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        !self.token.is_current()
    }

    pub fn generation(&self) -> u64 {
        self.token.generation()
    }

    /// Gives back the elements that have not been processed yet.
    pub fn into_remaining(self) -> Peekable<I> {
        self.elements
    }
}
