//! Lazy, depth-first flattening of an order into candidate groups.
//!
//! A composite buildpack is replaced in place by each group of its nested
//! order in turn, followed by the elements that came after it. Siblings keep
//! their positions. Once a module id is part of a candidate, later elements
//! with the same kind and id are skipped. Optional composites and the
//! prepended extensions order also produce a candidate without themselves,
//! after all of their nested groups. A composite that appears again inside
//! its own expansion is an error.

use std::sync::Arc;

use crate::detect::types::DetectError;
use crate::module::{DirStore, Group, GroupElement, ModuleDescriptor, Order};

/// One module of a flattened candidate together with its descriptor.
#[derive(Debug, Clone)]
pub struct CandidateModule {
  /// Carries the descriptor's api and homepage.
  pub element: GroupElement,
  pub descriptor: Arc<ModuleDescriptor>,
}

/// A fully flattened group: no composites, no extensions-order placeholders.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
  pub modules: Vec<CandidateModule>,
}

impl Candidate {
  pub fn group(&self) -> Vec<GroupElement> {
    self.modules.iter().map(|m| m.element.clone()).collect()
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }
}

/// Return a new order in which every group starts with the extensions order.
///
/// Every extension element is marked `extension` and `optional`. An empty
/// extensions order leaves the buildpacks order as it is.
pub fn prepend_extensions(order: &Order, order_ext: &Order) -> Order {
  if order_ext.is_empty() {
    return order.clone();
  }

  let extensions: Order = order_ext
    .iter()
    .map(|group| Group::new(group.group.iter().map(|el| el.clone().extension().optional()).collect()))
    .collect();

  order
    .iter()
    .map(|group| {
      let placeholder = GroupElement {
        order_extensions: extensions.clone(),
        ..Default::default()
      };
      Group::new(std::iter::once(placeholder).chain(group.group.iter().cloned()).collect())
    })
    .collect()
}

/// An element still to be flattened, with the composites it was expanded from.
#[derive(Clone)]
struct Pending {
  element: GroupElement,
  parents: Arc<Vec<String>>,
}

/// Alternatives still to be tried at one branching point.
struct Frame {
  done: Vec<CandidateModule>,
  alternatives: std::vec::IntoIter<Vec<Pending>>,
}

impl Frame {
  fn new(
    done: Vec<CandidateModule>,
    order: &Order,
    parents: Arc<Vec<String>>,
    rest: Vec<Pending>,
    optional: bool,
  ) -> Self {
    let mut alternatives: Vec<Vec<Pending>> = order
      .iter()
      .map(|group| {
        group
          .group
          .iter()
          .map(|element| Pending {
            element: element.clone(),
            parents: parents.clone(),
          })
          .chain(rest.iter().cloned())
          .collect()
      })
      .collect();
    if optional {
      alternatives.push(rest);
    }
    Self {
      done,
      alternatives: alternatives.into_iter(),
    }
  }
}

enum Step {
  Complete(Candidate),
  Branch(Frame),
}

/// Iterator over the candidates of an order, in the order they must be tried.
///
/// Stops after yielding the first error.
pub struct OrderExpander<'a> {
  store: &'a dyn DirStore,
  stack: Vec<Frame>,
}

impl<'a> OrderExpander<'a> {
  pub fn new(order: &Order, store: &'a dyn DirStore) -> Self {
    Self {
      store,
      stack: vec![Frame::new(Vec::new(), order, Arc::default(), Vec::new(), false)],
    }
  }

  fn walk(&self, mut done: Vec<CandidateModule>, elements: Vec<Pending>) -> Result<Step, DetectError> {
    let mut rest = elements.into_iter();
    while let Some(Pending { element, parents }) = rest.next() {
      if element.is_extensions_order() {
        return Ok(Step::Branch(Frame::new(
          done,
          &element.order_extensions,
          parents,
          rest.collect(),
          true,
        )));
      }

      let kind = element.kind();
      if done.iter().any(|m| m.element.kind() == kind && m.element.id == element.id) {
        continue;
      }

      let descriptor = self.store.lookup(kind, &element.id, &element.version)?;
      if descriptor.is_composite() {
        let key = element.key();
        if parents.contains(&key) {
          return Err(DetectError::CyclicOrder(key));
        }
        let mut chain = parents.as_ref().clone();
        chain.push(key);
        return Ok(Step::Branch(Frame::new(
          done,
          &descriptor.order,
          Arc::new(chain),
          rest.collect(),
          element.optional,
        )));
      }

      let element = element
        .with_api(descriptor.api.clone())
        .with_homepage(descriptor.info.homepage.clone());
      done.push(CandidateModule { element, descriptor });
    }
    Ok(Step::Complete(Candidate { modules: done }))
  }
}

impl Iterator for OrderExpander<'_> {
  type Item = Result<Candidate, DetectError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let frame = self.stack.last_mut()?;
      let Some(elements) = frame.alternatives.next() else {
        self.stack.pop();
        continue;
      };
      let done = frame.done.clone();

      match self.walk(done, elements) {
        Ok(Step::Complete(candidate)) => return Some(Ok(candidate)),
        Ok(Step::Branch(frame)) => self.stack.push(frame),
        Err(err) => {
          self.stack.clear();
          return Some(Err(err));
        }
      }
    }
  }
}
