use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::op::{Decoration, Op};
use crate::reader::Reader;
use crate::reflection::{Binding, EntryPoint, Reflection, ShaderStage};
use crate::resolve::{descriptor_kind, Producers};
use crate::{DuplicateBinding, MissingDecoration, ReflectError};

/// A decorated id whose set and binding indices may still be arriving.
#[derive(Debug)]
struct PendingBinding {
    id: u32,
    set: Option<u32>,
    binding: Option<u32>,
}

/// Pending bindings in order of first decoration.
#[derive(Debug, Default)]
struct PendingBindings {
    order: Vec<PendingBinding>,
    by_id: FxHashMap<u32, usize>,
}

impl PendingBindings {
    fn get_mut(&mut self, id: u32) -> &mut PendingBinding {
        let order = &mut self.order;
        let index = *self.by_id.entry(id).or_insert_with(|| {
            order.push(PendingBinding {
                id,
                set: None,
                binding: None,
            });
            order.len() - 1
        });

        &mut self.order[index]
    }
}

impl Reflection {
    /// Reflect a SPIR-V module.
    ///
    /// The module is read once, front to back. Entry points are collected as they appear.
    /// `DescriptorSet` and `Binding` decorations may arrive in any order relative to each other
    /// and to the declarations they decorate; the kind of every binding is worked out after the
    /// whole module has been read.
    pub fn parse(bytes: &[u8]) -> Result<Reflection, ReflectError> {
        let mut entry_points = vec![];
        let mut pending = PendingBindings::default();
        let mut producers = Producers::default();

        for inst in Reader::new(bytes)? {
            match Op::decode(&inst?)? {
                Op::EntryPoint { model, name, .. } => entry_points.push(EntryPoint {
                    stage: ShaderStage::from_execution_model(model)?,
                    name,
                }),
                Op::Decorate {
                    target,
                    decoration: Decoration::DescriptorSet,
                    value,
                } => pending.get_mut(target).set = value,
                Op::Decorate {
                    target,
                    decoration: Decoration::Binding,
                    value,
                } => pending.get_mut(target).binding = value,
                op => {
                    if let Some(id) = op.result_id() {
                        producers.insert(id, op);
                    }
                }
            }
        }

        let mut occupied = FxHashSet::default();
        let mut bindings = Vec::with_capacity(pending.order.len());

        for PendingBinding { id, set, binding } in pending.order {
            let set = set.ok_or(MissingDecoration {
                id,
                decoration: "descriptor set",
            })?;
            let binding = binding.ok_or(MissingDecoration {
                id,
                decoration: "binding",
            })?;
            let kind = descriptor_kind(&producers, id)?;

            if !occupied.insert((set, binding)) {
                return Err(DuplicateBinding { set, binding })?;
            }

            trace!("binding `%{id}` is {kind:?} at set {set} binding {binding}");
            bindings.push(Binding { set, binding, kind });
        }

        debug!(
            "reflected {} entry points and {} bindings",
            entry_points.len(),
            bindings.len()
        );

        Ok(Reflection {
            entry_points,
            bindings,
        })
    }
}
