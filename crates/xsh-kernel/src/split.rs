//! The command splitter.
//!
//! Splits a normalized string into a subcommand tree by operator priority.
//! Splitting is purely textual: all nested groups and quoted literals are
//! hidden behind placeholders by the normalizer, so an operator occurrence
//! in the string really is an operator.

use crate::engine::Engine;
use crate::rules::OpKind;

/// A node of the subcommand tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A scalar token, resolved by the converter.
    Leaf(String),
    /// An operator application over the pieces it split.
    Op { kind: OpKind, children: Vec<Node> },
}

/// Split a normalized command into its subcommand tree.
pub fn split_command(engine: &Engine, text: &str) -> Node {
    split_from(engine, text, 0)
}

fn split_from(engine: &Engine, text: &str, index: usize) -> Node {
    let ops = engine.rules().command();
    for (i, rule) in ops.iter().enumerate().skip(index) {
        if !rule.key.is_empty() && text.contains(rule.key.as_str()) {
            let children = text
                .split(rule.key.as_str())
                .map(|piece| split_from(engine, piece, i + 1))
                .collect();
            return Node::Op {
                kind: rule.kind,
                children,
            };
        }
    }
    Node::Leaf(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn split(text: &str) -> Node {
        let engine = Engine::with_core().unwrap();
        split_command(&engine, text)
    }

    fn leaf(s: &str) -> Node {
        Node::Leaf(s.to_string())
    }

    #[test]
    fn plain_token_is_a_leaf() {
        assert_eq!(split("42"), leaf("42"));
    }

    #[test]
    fn sequence_splits_before_pipe() {
        let node = split("a;b|c");
        let Node::Op { kind, children } = node else { panic!("expected op") };
        assert_eq!(kind, OpKind::Sequence);
        assert_eq!(children[0], leaf("a"));
        assert_eq!(
            children[1],
            Node::Op {
                kind: OpKind::Pipe,
                children: vec![leaf("b"), leaf("c")],
            }
        );
    }

    #[test]
    fn double_pipe_wins_over_single() {
        let node = split("a||b|c");
        let Node::Op { kind, children } = node else { panic!("expected op") };
        assert_eq!(kind, OpKind::Fail);
        assert_eq!(children[0], leaf("a"));
        assert_eq!(
            children[1],
            Node::Op {
                kind: OpKind::Pipe,
                children: vec![leaf("b"), leaf("c")],
            }
        );
    }

    #[test]
    fn spaces_split_into_params() {
        let node = split("concat 1 2");
        assert_eq!(
            node,
            Node::Op {
                kind: OpKind::Param,
                children: vec![leaf("concat"), leaf("1"), leaf("2")],
            }
        );
    }

    #[test]
    fn assignment_binds_tighter_than_sequence() {
        let node = split("4>>x;$x");
        let Node::Op { kind, children } = node else { panic!("expected op") };
        assert_eq!(kind, OpKind::Sequence);
        assert_eq!(
            children[0],
            Node::Op {
                kind: OpKind::Assign,
                children: vec![leaf("4"), leaf("x")],
            }
        );
        assert_eq!(children[1], leaf("$x"));
    }
}
