//
// Copyright (c) 2022 ZettaScale Technology
//
// This program and the accompanying materials are made available under the
// terms of the Eclipse Public License 2.0 which is available at
// http://www.eclipse.org/legal/epl-2.0, or the Apache License, Version 2.0
// which is available at https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: EPL-2.0 OR Apache-2.0
//
//! The resource-key wildcard matcher. `/` is the only segment separator;
//! `*` stands for exactly one non-empty, `/`-free segment and `**` for
//! zero or more segments (including none, including ones containing
//! `/`). `rname_intersect` decides whether two key patterns denote
//! overlapping sets of concrete names; it never fails, it only answers
//! yes or no.

/// `true` iff `left` and `right` denote overlapping sets of concrete
/// resource names. Symmetric and, restricted to wildcard-free keys,
/// reflexive and otherwise exact-match.
pub fn rname_intersect(left: &str, right: &str) -> bool {
    let a: Vec<&str> = left.split('/').collect();
    let b: Vec<&str> = right.split('/').collect();
    chunks_intersect(&a, &b)
}

fn chunks_intersect(a: &[&str], b: &[&str]) -> bool {
    match (a.first(), b.first()) {
        (None, None) => true,
        (Some(&"**"), _) => {
            chunks_intersect(&a[1..], b) || (!b.is_empty() && chunks_intersect(a, &b[1..]))
        }
        (_, Some(&"**")) => {
            chunks_intersect(a, &b[1..]) || (!a.is_empty() && chunks_intersect(&a[1..], b))
        }
        (Some(x), Some(y)) => segment_matches(x, y) && chunks_intersect(&a[1..], &b[1..]),
        _ => false,
    }
}

/// Whether two individual (non-`**`) segments can denote the same
/// concrete segment. `*` matches any non-empty segment on either side;
/// otherwise both must be byte-equal.
fn segment_matches(x: &str, y: &str) -> bool {
    match (x == "*", y == "*") {
        (true, true) => true,
        (true, false) => !y.is_empty(),
        (false, true) => !x.is_empty(),
        (false, false) => x == y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn star_matches_single_segment() {
        assert!(rname_intersect("/foo/*", "/foo/a"));
        assert!(!rname_intersect("/foo/*", "/foo/a/b"));
    }

    #[test]
    fn double_star_matches_any_remainder() {
        assert!(rname_intersect("/**", "/a/b/c"));
        assert!(rname_intersect("/a/**/z", "/a/q/r/z"));
    }

    #[test]
    fn double_star_matches_zero_segments() {
        assert!(rname_intersect("/a/**/z", "/a/z"));
    }

    #[test]
    fn concrete_keys_require_byte_equality() {
        assert!(rname_intersect("/a/b", "/a/b"));
        assert!(!rname_intersect("/a/b", "/a/c"));
        assert!(!rname_intersect("/a/b", "/a/b/c"));
    }

    #[test]
    fn star_does_not_match_empty_segment() {
        assert!(!rname_intersect("/a/*/b", "/a//b"));
    }

    // P1: matcher symmetry.
    #[test]
    fn property_matcher_is_symmetric() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let a = random_key(&mut rng);
            let b = random_key(&mut rng);
            assert_eq!(rname_intersect(&a, &b), rname_intersect(&b, &a));
        }
    }

    // P2: reflexivity and inequality on wildcard-free keys.
    #[test]
    fn property_concrete_keys_are_reflexive_and_distinct() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let a = random_concrete_key(&mut rng);
            assert!(rname_intersect(&a, &a));
            let b = random_concrete_key(&mut rng);
            if a != b {
                assert!(!rname_intersect(&a, &b));
            }
        }
    }

    fn random_key(rng: &mut impl Rng) -> String {
        let depth = rng.gen_range(1..5);
        let tokens = ["a", "b", "c", "*", "**"];
        (0..depth)
            .map(|_| tokens[rng.gen_range(0..tokens.len())])
            .collect::<Vec<_>>()
            .join("/")
    }

    fn random_concrete_key(rng: &mut impl Rng) -> String {
        let depth = rng.gen_range(1..5);
        let tokens = ["a", "b", "c"];
        (0..depth)
            .map(|_| tokens[rng.gen_range(0..tokens.len())])
            .collect::<Vec<_>>()
            .join("/")
    }
}
