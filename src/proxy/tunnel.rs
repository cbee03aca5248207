//! Layer stacks
//!
//! A [`LayerStack`] is an ordered plan, outermost layer first. Building it
//! records every layer in the context (so inner layers see the outer ones in
//! `Context::layers`) and then chains each layer to the next one as its child.

use std::ops::Index;

use crate::common::Connections;
use crate::error::{Error, Result};
use crate::layers;

use super::{Context, Layer, LayerKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerStack {
    kinds: Vec<LayerKind>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append a layer below the current innermost one
    pub fn with(mut self, kind: LayerKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Append a layer below the current innermost one
    pub fn push(&mut self, kind: LayerKind) {
        self.kinds.push(kind);
    }

    pub fn kinds(&self) -> &[LayerKind] {
        &self.kinds
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Instantiate the stack below `cx` and return its outermost layer
    pub fn build(&self, cx: &Context, conns: &mut Connections) -> Result<Layer> {
        let mut cx = cx.clone();
        let mut planned = Vec::with_capacity(self.kinds.len());
        for kind in &self.kinds {
            let handle = cx.push_layer(*kind);
            planned.push((handle, cx.clone()));
        }

        let mut child = None;
        for (handle, cx) in planned.into_iter().rev() {
            child = Some(layers::build_layer(handle, &cx, child, conns)?);
        }
        child.ok_or_else(|| Error::Protocol("cannot build an empty layer stack".into()))
    }
}

impl Index<usize> for LayerStack {
    type Output = LayerKind;

    fn index(&self, index: usize) -> &LayerKind {
        &self.kinds[index]
    }
}

impl<const N: usize> From<[LayerKind; N]> for LayerStack {
    fn from(kinds: [LayerKind; N]) -> Self {
        Self {
            kinds: kinds.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::HttpMode;
    use crate::testing::TestContext;

    #[test]
    fn test_outermost_first() {
        let stack = LayerStack::new()
            .with(LayerKind::ServerTls)
            .with(LayerKind::ClientTls)
            .with(LayerKind::Http(HttpMode::Transparent));
        assert_eq!(stack[0], LayerKind::ServerTls);
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_build_chains_children_and_contexts() {
        let mut t = TestContext::tcp();
        t.cx.push_layer(LayerKind::TransparentProxy);
        let stack = LayerStack::from([LayerKind::ServerTls, LayerKind::ClientTls]);

        let layer = stack.build(&t.cx, &mut t.conns).unwrap();
        assert_eq!(layer.kind(), LayerKind::ServerTls);
        assert_eq!(
            layer.stack_kinds(),
            vec![LayerKind::ServerTls, LayerKind::ClientTls]
        );

        let built = t.recorder().built();
        // innermost is instantiated first and sees every outer layer
        assert_eq!(
            built[0],
            vec![LayerKind::TransparentProxy, LayerKind::ServerTls, LayerKind::ClientTls]
        );
        assert_eq!(built[1], vec![LayerKind::TransparentProxy, LayerKind::ServerTls]);
        // the caller's context is untouched
        assert_eq!(t.cx.layers().len(), 1);
    }

    #[test]
    fn test_empty_stack_is_an_error() {
        let mut t = TestContext::tcp();
        assert!(LayerStack::new().build(&t.cx, &mut t.conns).is_err());
    }

    #[test]
    fn test_mode_layer_cannot_be_stacked() {
        let mut t = TestContext::tcp();
        let stack = LayerStack::from([LayerKind::ReverseProxy]);
        assert!(stack.build(&t.cx, &mut t.conns).is_err());
    }
}
