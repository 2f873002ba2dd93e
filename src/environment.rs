use crate::source::Span;
use crate::value::{List, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("[{1}] symbol({0}) not found")]
    UndefinedSymbol(String, Span), // Symbol name, span where lookup happened
}

impl EnvError {
    pub fn span(&self) -> Span {
        match self {
            EnvError::UndefinedSymbol(_, span) => *span,
        }
    }
}

/// Handle to a frame in [`Environments`]. A handle whose frame has been
/// collected no longer resolves, even if the slot gets reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EnvId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Frame {
    outer: Option<EnvId>,
    bindings: HashMap<String, Value>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    frame: Option<Frame>,
}

/// Arena of scope frames. Closures refer to the frame they captured by
/// [`EnvId`], so reference cycles between closures and scopes cannot leak;
/// unreachable frames are reclaimed by [`Environments::collect_garbage`].
#[derive(Debug, Default)]
pub struct Environments {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Environments {
    pub fn new() -> Self {
        Environments::default()
    }

    /// Creates an empty frame. `None` makes a root frame.
    pub fn create(&mut self, outer: Option<EnvId>) -> EnvId {
        let frame = Frame {
            outer,
            bindings: HashMap::new(),
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.frame = Some(frame);
            return EnvId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            frame: Some(frame),
        });
        EnvId {
            index,
            generation: 0,
        }
    }

    /// Creates a frame under `outer` binding `params` to `args` pairwise.
    /// A `&` parameter binds the following name to a list of the remaining
    /// arguments. Callers check arity first; missing arguments bind `nil`.
    pub fn bind(&mut self, outer: EnvId, params: &[String], args: Vec<Value>) -> EnvId {
        let env = self.create(Some(outer));
        let mut args = args.into_iter();
        let mut names = params.iter();
        while let Some(name) = names.next() {
            if name == "&" {
                if let Some(rest) = names.next() {
                    let rest_args: List = args.by_ref().collect();
                    self.set(env, rest.clone(), Value::List(rest_args));
                }
                break;
            }
            self.set(env, name.clone(), args.next().unwrap_or(Value::Nil));
        }
        env
    }

    fn frame(&self, id: EnvId) -> Option<&Frame> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_ref())
    }

    fn frame_mut(&mut self, id: EnvId) -> Option<&mut Frame> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_mut())
    }

    pub fn contains(&self, id: EnvId) -> bool {
        self.frame(id).is_some()
    }

    /// Binds `name` in this frame only, replacing any previous binding here.
    pub fn set(&mut self, env: EnvId, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.frame_mut(env) {
            Some(frame) => {
                frame.bindings.insert(name, value);
            }
            None => warn!(%name, ?env, "set on a collected environment"),
        }
    }

    /// Walks outward from `env` to the first frame binding `name`.
    pub fn find(&self, env: EnvId, name: &str) -> Option<&Value> {
        let mut current = Some(env);
        while let Some(id) = current {
            let frame = self.frame(id)?;
            if let Some(value) = frame.bindings.get(name) {
                return Some(value);
            }
            current = frame.outer;
        }
        None
    }

    pub fn get(&self, env: EnvId, name: &str, span: Span) -> Result<Value, EnvError> {
        self.find(env, name)
            .cloned()
            .ok_or_else(|| EnvError::UndefinedSymbol(name.to_string(), span))
    }

    /// Every name visible from `env`.
    pub fn identifiers(&self, env: EnvId) -> HashSet<String> {
        let mut identifiers = HashSet::new();
        let mut current = Some(env);
        while let Some(frame) = current.and_then(|id| self.frame(id)) {
            identifiers.extend(frame.bindings.keys().cloned());
            current = frame.outer;
        }
        identifiers
    }

    pub fn live_frames(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Frees every frame not reachable from `roots`, following outer links
    /// and the environments captured by bound closures. Returns the number of
    /// frames released.
    pub fn collect_garbage(&mut self, roots: &[EnvId]) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut pending: Vec<EnvId> = roots.to_vec();
        while let Some(id) = pending.pop() {
            let Some(frame) = self.frame(id) else {
                continue;
            };
            let index = id.index as usize;
            if marked[index] {
                continue;
            }
            marked[index] = true;
            pending.extend(frame.outer);
            for value in frame.bindings.values() {
                value.captured_envs(&mut pending);
            }
        }

        let mut released = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.frame.is_some() && !marked[index] {
                slot.frame = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                released += 1;
            }
        }
        released
    }
}
