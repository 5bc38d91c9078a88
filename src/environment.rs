//! Environment chain, stored as an arena of frames addressed by [`EnvId`].
//!
//! Closures keep the id of the frame they were created in instead of a
//! reference to it, so environments, classes and instances can point at each
//! other without reference‑counting cycles.  Frame `0` is the global scope.
//!
//! A frame that no closure ever captured is dropped again when its scope
//! exits ([`Environments::release`]) and its slot is reused by the next
//! [`push`](Environments::push); captured frames live until the interpreter
//! is dropped.

use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;
use anyhow::anyhow;
use log::debug;
use std::collections::HashMap;

/// Handle to one frame in [`Environments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(usize);

#[derive(Debug)]
struct Frame<'a> {
    values: HashMap<&'a str, Value<'a>>,
    enclosing: Option<EnvId>,
    captured: bool,
}

#[derive(Debug)]
pub struct Environments<'a> {
    /// `None` marks a released slot, listed in `free`.
    frames: Vec<Option<Frame<'a>>>,
    free: Vec<EnvId>,
}

impl<'a> Default for Environments<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Environments<'a> {
    /// An arena holding only an empty global frame.
    pub fn new() -> Self {
        Self::with_globals(std::iter::empty())
    }

    /// An arena whose global frame starts out holding `globals`.
    pub fn with_globals<I>(globals: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Value<'a>)>,
    {
        Environments {
            frames: vec![Some(Frame {
                values: globals.into_iter().collect(),
                enclosing: None,
                captured: true,
            })],
            free: Vec::new(),
        }
    }

    pub const fn globals(&self) -> EnvId {
        EnvId(0)
    }

    /// Number of live frames, globals included.
    pub fn len(&self) -> usize {
        self.frames.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a new frame nested in `enclosing`, reusing a released slot when
    /// there is one.
    pub fn push(&mut self, enclosing: EnvId) -> EnvId {
        let frame = Frame {
            values: HashMap::new(),
            enclosing: Some(enclosing),
            captured: false,
        };

        match self.free.pop() {
            Some(id) => {
                self.frames[id.0] = Some(frame);
                id
            }
            None => {
                self.frames.push(Some(frame));
                EnvId(self.frames.len() - 1)
            }
        }
    }

    /// Mark `env` and all of its ancestors as reachable from a closure.
    pub fn capture(&mut self, env: EnvId) {
        let mut current = Some(env);

        while let Some(id) = current {
            let Some(Some(frame)) = self.frames.get_mut(id.0) else {
                return;
            };

            if frame.captured {
                return;
            }

            frame.captured = true;
            current = frame.enclosing;
        }
    }

    /// Scope exit.  An uncaptured frame is dropped and its slot freed; a
    /// captured one stays.  Nothing can still refer to an uncaptured frame
    /// here: a closure over any descendant would have captured it too.
    pub fn release(&mut self, env: EnvId) {
        let Some(slot) = self.frames.get_mut(env.0) else {
            return;
        };

        if matches!(slot, Some(frame) if !frame.captured) {
            *slot = None;
            self.free.push(env);
        }
    }

    /// Create or overwrite `name` in `env` itself.
    pub fn define(&mut self, env: EnvId, name: &'a str, value: Value<'a>) -> Result<()> {
        debug!("define '{}' in {:?}", name, env);

        self.frame_mut(env)?.values.insert(name, value);

        Ok(())
    }

    /// Look `name` up from `env` outward.
    pub fn get(&self, env: EnvId, name: &Token<'_>) -> Result<Value<'a>> {
        let mut current = Some(env);

        while let Some(id) = current {
            let frame = self.frame(id)?;

            if let Some(value) = frame.values.get(name.lexeme) {
                return Ok(value.clone());
            }

            current = frame.enclosing;
        }

        Err(LoxError::runtime(
            name.line,
            format!("Undefined variable '{}'.", name.lexeme),
        ))
    }

    /// Overwrite the nearest existing binding of `name`, from `env` outward.
    pub fn assign(&mut self, env: EnvId, name: &Token<'_>, value: Value<'a>) -> Result<()> {
        let mut current = Some(env);

        while let Some(id) = current {
            let frame = self.frame_mut(id)?;

            if let Some(slot) = frame.values.get_mut(name.lexeme) {
                *slot = value;
                return Ok(());
            }

            current = frame.enclosing;
        }

        Err(LoxError::runtime(
            name.line,
            format!("Undefined variable '{}'.", name.lexeme),
        ))
    }

    /// Read `name` exactly `distance` frames out.  A miss is a resolver bug.
    pub fn get_at(&self, env: EnvId, distance: usize, name: &str) -> Result<Value<'a>> {
        let target = self.ancestor(env, distance)?;

        self.frame(target)?.values.get(name).cloned().ok_or_else(|| {
            LoxError::from(anyhow!(
                "'{}' not found {} frame(s) out from {:?}",
                name,
                distance,
                env
            ))
        })
    }

    /// Write `name` exactly `distance` frames out.  A miss is a resolver bug.
    pub fn assign_at(
        &mut self,
        env: EnvId,
        distance: usize,
        name: &str,
        value: Value<'a>,
    ) -> Result<()> {
        let target = self.ancestor(env, distance)?;

        match self.frame_mut(target)?.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(anyhow!(
                "cannot assign '{}' {} frame(s) out from {:?}",
                name,
                distance,
                env
            )
            .into()),
        }
    }

    fn ancestor(&self, env: EnvId, distance: usize) -> Result<EnvId> {
        let mut current = env;

        for _ in 0..distance {
            current = self
                .frame(current)?
                .enclosing
                .ok_or_else(|| anyhow!("scope chain of {:?} shorter than {}", env, distance))?;
        }

        Ok(current)
    }

    fn frame(&self, id: EnvId) -> Result<&Frame<'a>> {
        self.frames
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| anyhow!("dangling environment {:?}", id).into())
    }

    fn frame_mut(&mut self, id: EnvId) -> Result<&mut Frame<'a>> {
        self.frames
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| anyhow!("dangling environment {:?}", id).into())
    }
}
