//! Nested note spaces kept in memory for the session.
//!
//! Spaces live in an arena; ids are generational so an id kept across a
//! removal can never point at a node created later in the same slot.

use std::fmt;

/// Separator used by [`SpaceTree::path`] and [`SpaceTree::resolve`]
pub const PATH_SEPARATOR: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaceId {
    index: u32,
    generation: u32,
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SpaceError {
    #[error("Unknown space {0}")]
    UnknownSpace(SpaceId),
    #[error("Invalid space name {0:?}")]
    InvalidName(String),
    #[error("A space named {0:?} already exists here")]
    DuplicateName(String),
    #[error("Cannot move a space into itself or one of its descendants")]
    Cycle,
}

#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<SpaceId>,
    children: Vec<SpaceId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Default)]
pub struct SpaceTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: Vec<SpaceId>,
    len: usize,
}

impl SpaceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: SpaceId) -> bool {
        self.node(id).is_ok()
    }

    fn node(&self, id: SpaceId) -> Result<&Node, SpaceError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(SpaceError::UnknownSpace(id))
    }

    fn node_mut(&mut self, id: SpaceId) -> Result<&mut Node, SpaceError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(SpaceError::UnknownSpace(id))
    }

    fn siblings(&self, parent: Option<SpaceId>) -> Result<&[SpaceId], SpaceError> {
        match parent {
            Some(parent) => Ok(&self.node(parent)?.children),
            None => Ok(&self.roots),
        }
    }

    fn siblings_mut(&mut self, parent: Option<SpaceId>) -> Result<&mut Vec<SpaceId>, SpaceError> {
        match parent {
            Some(parent) => Ok(&mut self.node_mut(parent)?.children),
            None => Ok(&mut self.roots),
        }
    }

    fn check_name(
        &self,
        name: &str,
        parent: Option<SpaceId>,
        except: Option<SpaceId>,
    ) -> Result<String, SpaceError> {
        let name = name.trim();
        if name.is_empty() || name.contains(PATH_SEPARATOR) {
            return Err(SpaceError::InvalidName(name.to_string()));
        }
        for &sibling in self.siblings(parent)? {
            if Some(sibling) != except && self.node(sibling)?.name == name {
                return Err(SpaceError::DuplicateName(name.to_string()));
            }
        }
        Ok(name.to_string())
    }

    /// Add a space under `parent`, or at the top level.
    pub fn create(&mut self, name: &str, parent: Option<SpaceId>) -> Result<SpaceId, SpaceError> {
        let name = self.check_name(name, parent, None)?;
        let node = Node {
            name,
            parent,
            children: Vec::new(),
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                SpaceId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                SpaceId {
                    index,
                    generation: 0,
                }
            }
        };

        self.siblings_mut(parent)?.push(id);
        self.len += 1;
        Ok(id)
    }

    pub fn rename(&mut self, id: SpaceId, name: &str) -> Result<(), SpaceError> {
        let parent = self.node(id)?.parent;
        let name = self.check_name(name, parent, Some(id))?;
        self.node_mut(id)?.name = name;
        Ok(())
    }

    /// Re-parent a space. Targets inside its own subtree are rejected.
    pub fn move_to(&mut self, id: SpaceId, new_parent: Option<SpaceId>) -> Result<(), SpaceError> {
        let (name, old_parent) = {
            let node = self.node(id)?;
            (node.name.clone(), node.parent)
        };

        let mut cursor = new_parent;
        while let Some(ancestor) = cursor {
            if ancestor == id {
                return Err(SpaceError::Cycle);
            }
            cursor = self.node(ancestor)?.parent;
        }
        if old_parent == new_parent {
            return Ok(());
        }
        self.check_name(&name, new_parent, Some(id))?;

        self.siblings_mut(old_parent)?.retain(|&child| child != id);
        self.siblings_mut(new_parent)?.push(id);
        self.node_mut(id)?.parent = new_parent;
        Ok(())
    }

    /// Remove a space with everything below it. Returns how many were removed.
    pub fn remove(&mut self, id: SpaceId) -> Result<usize, SpaceError> {
        let parent = self.node(id)?.parent;
        self.siblings_mut(parent)?.retain(|&child| child != id);

        let mut stack = vec![id];
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current.index as usize];
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                stack.extend(node.children);
                removed += 1;
            }
        }
        self.len -= removed;
        Ok(removed)
    }

    pub fn name(&self, id: SpaceId) -> Result<&str, SpaceError> {
        Ok(&self.node(id)?.name)
    }

    pub fn parent(&self, id: SpaceId) -> Result<Option<SpaceId>, SpaceError> {
        Ok(self.node(id)?.parent)
    }

    /// Direct children in creation order; `None` lists the top level.
    pub fn children(&self, id: Option<SpaceId>) -> Result<&[SpaceId], SpaceError> {
        self.siblings(id)
    }

    /// Names from the top level down to `id`, joined with `/`.
    pub fn path(&self, id: SpaceId) -> Result<String, SpaceError> {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current)?;
            names.push(node.name.as_str());
            cursor = node.parent;
        }
        names.reverse();
        Ok(names.join(PATH_SEPARATOR))
    }

    /// Find a space by its `/`-separated path.
    pub fn resolve(&self, path: &str) -> Option<SpaceId> {
        let mut current = None;
        for part in path.split(PATH_SEPARATOR).filter(|p| !p.trim().is_empty()) {
            let part = part.trim();
            let next = self
                .siblings(current)
                .ok()?
                .iter()
                .copied()
                .find(|&child| self.node(child).is_ok_and(|node| node.name == part))?;
            current = Some(next);
        }
        current
    }

    /// Every space with its depth, parents before children.
    pub fn walk(&self) -> Vec<(usize, SpaceId)> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack: Vec<(usize, SpaceId)> = self.roots.iter().rev().map(|&id| (0, id)).collect();
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            if let Ok(node) = self.node(id) {
                stack.extend(node.children.iter().rev().map(|&child| (depth + 1, child)));
            }
        }
        out
    }
}
