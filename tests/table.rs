mod common {
    use std::io::Write;

    pub fn init() {
        let _ = env_logger::builder()
            .format(|buf, record| writeln!(buf, "{}", record.args()))
            .is_test(true)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use crate::common;
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;
    use std::net::{IpAddr, Ipv4Addr};
    use std::str::FromStr;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use lpm_store::{
        MatchOptions, MatchType, Prefix, PrefixStoreError, Table,
    };

    fn pfx(s: &str) -> Prefix {
        Prefix::from_str(s).unwrap()
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn mask4(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            !(u32::MAX >> (len - 1) >> 1)
        }
    }

    // Linear-scan reference for the longest covering prefix.
    fn model_lookup(
        model: &BTreeMap<(u32, u8), u32>,
        addr: u32,
    ) -> Option<((u32, u8), u32)> {
        model
            .iter()
            .filter(|((bits, len), _)| addr & mask4(*len) == *bits & mask4(*len))
            .max_by_key(|((_, len), _)| *len)
            .map(|(k, v)| (*k, *v))
    }

    fn model_overlaps(
        model: &BTreeMap<(u32, u8), u32>,
        bits: u32,
        len: u8,
    ) -> bool {
        model.keys().any(|(qbits, qlen)| {
            let m = mask4(len.min(*qlen));
            bits & m == qbits & m
        })
    }

    #[test]
    fn test_empty_table() {
        common::init();
        let table: Table<u32> = Table::new();
        assert!(!table.contains(addr("10.0.0.1")));
        assert_eq!(table.lookup(addr("10.0.0.1")), None);
        assert_eq!(table.size(), 0);
        assert!(table.is_empty());
        assert_eq!(table.all().count(), 0);
        // only the two family roots exist
        assert_eq!(table.nodes_count(), 2);
    }

    #[test]
    fn test_single_prefix() {
        common::init();
        let mut table = Table::new();
        assert_eq!(table.insert(&pfx("10.0.0.0/8"), "A"), None);

        assert!(table.contains(addr("10.1.2.3")));
        assert_eq!(
            table.lookup(addr("10.1.2.3")),
            Some((pfx("10.0.0.0/8"), &"A"))
        );
        assert!(!table.contains(addr("11.0.0.1")));
        assert_eq!(table.lookup(addr("11.0.0.1")), None);
        assert_eq!(table.size(), 1);
        assert_eq!(table.size4(), 1);
        assert_eq!(table.size6(), 0);
    }

    #[test]
    fn test_overlapping_prefixes() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), "A");
        table.insert(&pfx("10.1.0.0/16"), "B");
        table.insert(&pfx("10.1.2.0/24"), "C");

        assert_eq!(
            table.lookup(addr("10.1.2.3")),
            Some((pfx("10.1.2.0/24"), &"C"))
        );
        assert_eq!(
            table.lookup(addr("10.1.3.3")),
            Some((pfx("10.1.0.0/16"), &"B"))
        );
        assert_eq!(
            table.lookup(addr("10.2.0.1")),
            Some((pfx("10.0.0.0/8"), &"A"))
        );

        let supernets: Vec<Prefix> =
            table.supernets(&pfx("10.1.2.0/24")).map(|(p, _)| p).collect();
        assert_eq!(
            supernets,
            vec![pfx("10.0.0.0/8"), pfx("10.1.0.0/16"), pfx("10.1.2.0/24")]
        );
    }

    #[test]
    fn test_default_route() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("0.0.0.0/0"), "D");
        table.insert(&pfx("192.168.0.0/16"), "E");

        assert_eq!(
            table.lookup(addr("192.168.1.1")),
            Some((pfx("192.168.0.0/16"), &"E"))
        );
        assert_eq!(
            table.lookup(addr("8.8.8.8")),
            Some((pfx("0.0.0.0/0"), &"D"))
        );
        assert!(table.contains(addr("255.255.255.255")));

        assert_eq!(table.delete(&pfx("0.0.0.0/0")), Some("D"));
        assert_eq!(table.lookup(addr("8.8.8.8")), None);
    }

    #[test]
    fn test_delete_and_collapse() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.1.2.0/24"), "A");
        table.insert(&pfx("10.1.3.0/24"), "B");
        // the two routes share 16 bits, so two interior nodes exist
        assert_eq!(table.nodes_count(), 4);

        assert_eq!(table.delete(&pfx("10.1.3.0/24")), Some("B"));
        assert_eq!(table.size(), 1);
        assert!(!table.contains(addr("10.1.3.1")));
        assert!(table.contains(addr("10.1.2.1")));
        // the remaining route collapses back into a compressed child
        assert_eq!(table.nodes_count(), 2);
        assert_eq!(
            table.lookup(addr("10.1.2.1")),
            Some((pfx("10.1.2.0/24"), &"A"))
        );
    }

    #[test]
    fn test_fringe_expansion() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/24"), "A");
        table.insert(&pfx("10.0.0.5/32"), "B");

        assert_eq!(
            table.lookup(addr("10.0.0.5")),
            Some((pfx("10.0.0.5/32"), &"B"))
        );
        assert_eq!(
            table.lookup(addr("10.0.0.6")),
            Some((pfx("10.0.0.0/24"), &"A"))
        );
        assert_eq!(table.get(&pfx("10.0.0.0/24")), Some(&"A"));
        assert_eq!(table.get(&pfx("10.0.0.5/32")), Some(&"B"));
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn test_insert_persist() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), "A");

        let table2 = table.insert_persist(&pfx("10.1.0.0/16"), "B");

        assert_eq!(
            table.lookup(addr("10.1.2.3")),
            Some((pfx("10.0.0.0/8"), &"A"))
        );
        assert_eq!(
            table2.lookup(addr("10.1.2.3")),
            Some((pfx("10.1.0.0/16"), &"B"))
        );
        assert_eq!(table.size(), 1);
        assert_eq!(table2.size(), 2);
    }

    #[test]
    fn test_update_and_delete_persist() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), 1u32);
        table.insert(&pfx("10.1.0.0/16"), 2u32);

        let bumped = table.update_persist(&pfx("10.0.0.0/8"), |old| {
            old.unwrap_or(0) + 10
        });
        assert_eq!(table.get(&pfx("10.0.0.0/8")), Some(&1));
        assert_eq!(bumped.get(&pfx("10.0.0.0/8")), Some(&11));

        let trimmed = table.delete_persist(&pfx("10.1.0.0/16"));
        assert_eq!(table.size(), 2);
        assert_eq!(trimmed.size(), 1);
        assert_eq!(trimmed.get(&pfx("10.1.0.0/16")), None);
        assert_eq!(table.get(&pfx("10.1.0.0/16")), Some(&2));
    }

    #[test]
    fn test_insert_idempotent() {
        common::init();
        let mut table = Table::new();
        assert_eq!(table.insert(&pfx("10.0.0.0/8"), 7u32), None);
        assert_eq!(table.insert(&pfx("10.0.0.0/8"), 7u32), Some(7));
        assert_eq!(table.size(), 1);
        assert_eq!(table.all().count(), 1);
    }

    #[test]
    fn test_update() {
        common::init();
        let mut table = Table::new();
        // creates missing entries like insert does
        assert_eq!(table.update(&pfx("10.0.0.0/8"), |old| match old {
            Some(v) => v + 1,
            None => 1u32,
        }), 1);
        assert_eq!(table.update(&pfx("10.0.0.0/8"), |old| match old {
            Some(v) => v + 1,
            None => 1u32,
        }), 2);
        assert_eq!(table.get(&pfx("10.0.0.0/8")), Some(&2));
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn test_delete_nonexistent() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), "A");
        assert_eq!(table.delete(&pfx("10.2.0.0/16")), None);
        assert_eq!(table.delete(&pfx("11.0.0.0/8")), None);
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn test_canonicalization() {
        common::init();
        let mut table = Table::new();
        // host bits are masked off on entry
        let relaxed =
            Prefix::new_relaxed(addr("10.1.2.3"), 8).unwrap();
        table.insert(&relaxed, "A");
        assert_eq!(table.get(&pfx("10.0.0.0/8")), Some(&"A"));
        let stored: Vec<Prefix> = table.all().map(|(p, _)| p).collect();
        assert_eq!(stored, vec![pfx("10.0.0.0/8")]);
    }

    #[test]
    fn test_host_routes() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("1.2.3.4/32"), "H");
        assert!(table.contains(addr("1.2.3.4")));
        assert!(!table.contains(addr("1.2.3.5")));
        assert_eq!(
            table.lookup(addr("1.2.3.4")),
            Some((pfx("1.2.3.4/32"), &"H"))
        );
        assert_eq!(table.get(&pfx("1.2.3.4/32")), Some(&"H"));
        assert_eq!(table.delete(&pfx("1.2.3.4/32")), Some("H"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_subnets() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), 0u32);
        table.insert(&pfx("10.1.0.0/16"), 1);
        table.insert(&pfx("10.1.2.0/24"), 2);
        table.insert(&pfx("10.200.0.0/16"), 3);
        table.insert(&pfx("11.0.0.0/8"), 4);
        table.insert(&pfx("10.1.129.0/25"), 5);

        let subs: BTreeSet<String> = table
            .subnets(&pfx("10.1.0.0/16"))
            .map(|(p, _)| p.to_string())
            .collect();
        let expect: BTreeSet<String> =
            ["10.1.0.0/16", "10.1.2.0/24", "10.1.129.0/25"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        assert_eq!(subs, expect);

        let all_of_it: BTreeSet<String> = table
            .subnets(&pfx("0.0.0.0/0"))
            .map(|(p, _)| p.to_string())
            .collect();
        assert_eq!(all_of_it.len(), 6);

        assert_eq!(table.subnets(&pfx("10.4.0.0/16")).count(), 0);
    }

    #[test]
    fn test_supernets_with_leaves() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/9"), "A");
        table.insert(&pfx("10.1.2.0/24"), "B");

        let supers: Vec<Prefix> =
            table.supernets(&pfx("10.1.2.0/25")).map(|(p, _)| p).collect();
        assert_eq!(supers, vec![pfx("10.0.0.0/9"), pfx("10.1.2.0/24")]);

        // no covering routes at all
        assert_eq!(table.supernets(&pfx("12.0.0.0/8")).count(), 0);
    }

    #[test]
    fn test_overlaps_prefix() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.1.0.0/16"), "A");

        // covered, covering, equal, disjoint
        assert!(table.overlaps_prefix(&pfx("10.1.2.0/24")));
        assert!(table.overlaps_prefix(&pfx("10.0.0.0/8")));
        assert!(table.overlaps_prefix(&pfx("10.1.0.0/16")));
        assert!(table.overlaps_prefix(&pfx("0.0.0.0/0")));
        assert!(!table.overlaps_prefix(&pfx("10.2.0.0/16")));
        assert!(!table.overlaps_prefix(&pfx("11.0.0.0/8")));

        let empty: Table<&str> = Table::new();
        assert!(!empty.overlaps_prefix(&pfx("0.0.0.0/0")));
    }

    #[test]
    fn test_overlaps_tables() {
        common::init();
        let mut a = Table::new();
        let mut b = Table::new();
        a.insert(&pfx("10.0.0.0/8"), 1u32);
        b.insert(&pfx("10.250.0.0/16"), 2u32);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));

        let mut c = Table::new();
        c.insert(&pfx("11.0.0.0/8"), 3u32);
        c.insert(&pfx("192.168.0.0/24"), 4u32);
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));

        c.insert(&pfx("10.250.1.2/32"), 5u32);
        assert!(b.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn test_union() {
        common::init();
        let mut ours = Table::new();
        ours.insert(&pfx("10.0.0.0/8"), 1u32);
        ours.insert(&pfx("10.1.0.0/16"), 1);

        let mut theirs = Table::new();
        theirs.insert(&pfx("10.1.0.0/16"), 2);
        theirs.insert(&pfx("10.1.2.0/24"), 2);

        let mut merged = ours.clone();
        merged.union(&theirs);
        assert_eq!(merged.size(), 3);
        // other side wins on conflict
        assert_eq!(merged.get(&pfx("10.1.0.0/16")), Some(&2));

        let mut kept = ours.clone();
        kept.union_with(&theirs, |ours, _theirs| *ours);
        assert_eq!(kept.size(), 3);
        assert_eq!(kept.get(&pfx("10.1.0.0/16")), Some(&1));
    }

    #[test]
    fn test_clone_independence() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), 1u32);
        table.insert(&pfx("10.1.0.0/16"), 2);

        let mut copy = table.clone();
        assert_eq!(copy.size(), table.size());

        copy.insert(&pfx("10.1.2.0/24"), 3);
        copy.delete(&pfx("10.0.0.0/8"));

        assert_eq!(table.size(), 2);
        assert_eq!(table.get(&pfx("10.0.0.0/8")), Some(&1));
        assert_eq!(table.get(&pfx("10.1.2.0/24")), None);
        assert_eq!(copy.size(), 2);
        assert_eq!(copy.get(&pfx("10.0.0.0/8")), None);
    }

    #[test]
    fn test_match_prefix() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), 1u32);
        table.insert(&pfx("10.1.0.0/16"), 2);
        table.insert(&pfx("10.1.2.0/24"), 3);

        let res = table.match_prefix(
            &pfx("10.1.0.0/16"),
            &MatchOptions {
                match_type: MatchType::ExactMatch,
                include_less_specifics: true,
                include_more_specifics: true,
            },
        );
        assert_eq!(res.prefix, Some(pfx("10.1.0.0/16")));
        assert_eq!(res.value, Some(2));
        assert_eq!(
            res.less_specifics,
            vec![(pfx("10.0.0.0/8"), 1)]
        );
        assert_eq!(
            res.more_specifics,
            vec![(pfx("10.1.2.0/24"), 3)]
        );

        // not stored exactly: exact misses, longest falls back
        let res = table.match_prefix(
            &pfx("10.1.2.0/26"),
            &MatchOptions {
                match_type: MatchType::ExactMatch,
                include_less_specifics: false,
                include_more_specifics: false,
            },
        );
        assert_eq!(res.prefix, None);
        assert_eq!(res.value, None);

        let res = table.match_prefix(
            &pfx("10.1.2.0/26"),
            &MatchOptions {
                match_type: MatchType::LongestMatch,
                include_less_specifics: false,
                include_more_specifics: false,
            },
        );
        assert_eq!(res.prefix, Some(pfx("10.1.2.0/24")));
        assert_eq!(res.value, Some(3));

        let res = table.match_prefix(
            &pfx("10.0.0.0/8"),
            &MatchOptions {
                match_type: MatchType::EmptyMatch,
                include_less_specifics: false,
                include_more_specifics: true,
            },
        );
        assert_eq!(res.prefix, None);
        assert_eq!(res.value, None);
        assert_eq!(res.more_specifics.len(), 2);
    }

    #[test]
    fn test_lookup_prefix_methods() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), "A");
        table.insert(&pfx("10.1.0.0/16"), "B");

        assert_eq!(table.lookup_prefix(&pfx("10.1.0.0/16")), Some(&"B"));
        assert_eq!(table.lookup_prefix(&pfx("10.1.0.0/17")), None);

        assert_eq!(
            table.lookup_prefix_lpm(&pfx("10.1.0.0/17")),
            Some((pfx("10.1.0.0/16"), &"B"))
        );
        assert_eq!(
            table.lookup_prefix_lpm(&pfx("10.1.0.0/16")),
            Some((pfx("10.1.0.0/16"), &"B"))
        );
        assert_eq!(
            table.lookup_prefix_lpm(&pfx("10.2.0.0/16")),
            Some((pfx("10.0.0.0/8"), &"A"))
        );
        assert_eq!(table.lookup_prefix_lpm(&pfx("11.0.0.0/8")), None);
    }

    #[test]
    fn test_size_for_len() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), 1u32);
        table.insert(&pfx("11.0.0.0/8"), 2);
        table.insert(&pfx("10.1.0.0/16"), 3);

        assert_eq!(table.size4_for_len(8), Ok(2));
        assert_eq!(table.size4_for_len(16), Ok(1));
        assert_eq!(table.size4_for_len(24), Ok(0));
        assert_eq!(
            table.size4_for_len(33),
            Err(PrefixStoreError::PrefixLengthInvalid)
        );
        assert_eq!(table.size6_for_len(64), Ok(0));
        assert_eq!(
            table.size6_for_len(129),
            Err(PrefixStoreError::PrefixLengthInvalid)
        );

        table.delete(&pfx("10.0.0.0/8"));
        assert_eq!(table.size4_for_len(8), Ok(1));
    }

    #[test]
    fn test_serde_round_trip() {
        common::init();
        let mut table = Table::new();
        table.insert(&pfx("10.0.0.0/8"), 1u32);
        table.insert(&pfx("10.1.0.0/16"), 2);
        table.insert(&pfx("0.0.0.0/0"), 3);

        let json = serde_json::to_string(&table).unwrap();
        let back: Table<u32> = serde_json::from_str(&json).unwrap();

        assert_eq!(back.size(), table.size());
        let ours: BTreeSet<String> = table
            .all()
            .map(|(p, v)| format!("{} {}", p, v))
            .collect();
        let theirs: BTreeSet<String> = back
            .all()
            .map(|(p, v)| format!("{} {}", p, v))
            .collect();
        assert_eq!(ours, theirs);
    }

    #[test]
    fn test_random_consistency() {
        common::init();
        let mut rng = StdRng::seed_from_u64(20240801);
        let mut table = Table::new();
        let mut model: BTreeMap<(u32, u8), u32> = BTreeMap::new();

        for i in 0..2000u32 {
            let len = rng.random_range(0..=32u8);
            let bits: u32 = rng.random::<u32>() & mask4(len);
            let prefix = Prefix::new(
                IpAddr::V4(Ipv4Addr::from(bits)),
                len,
            )
            .unwrap();
            let old_t = table.insert(&prefix, i);
            let old_m = model.insert((bits, len), i);
            assert_eq!(old_t, old_m);
        }
        assert_eq!(table.size(), model.len());

        // enumeration yields exactly the model
        let stored: BTreeSet<(u32, u8)> = table
            .all4()
            .map(|(p, _)| match p.addr() {
                IpAddr::V4(a) => (u32::from(a), p.len()),
                IpAddr::V6(_) => unreachable!(),
            })
            .collect();
        let expected: BTreeSet<(u32, u8)> =
            model.keys().copied().collect();
        assert_eq!(stored, expected);

        // lookups agree with a linear scan
        for _ in 0..2000 {
            let probe: u32 = rng.random();
            let probe_addr = IpAddr::V4(Ipv4Addr::from(probe));
            let got = table.lookup(probe_addr).map(|(p, v)| {
                match p.addr() {
                    IpAddr::V4(a) => ((u32::from(a), p.len()), *v),
                    IpAddr::V6(_) => unreachable!(),
                }
            });
            assert_eq!(got, model_lookup(&model, probe));
            assert_eq!(table.contains(probe_addr), got.is_some());
        }

        // overlap test agrees with a linear scan
        for _ in 0..500 {
            let len = rng.random_range(0..=32u8);
            let bits: u32 = rng.random::<u32>() & mask4(len);
            let probe = Prefix::new(
                IpAddr::V4(Ipv4Addr::from(bits)),
                len,
            )
            .unwrap();
            assert_eq!(
                table.overlaps_prefix(&probe),
                model_overlaps(&model, bits, len),
            );
        }

        // delete half of everything and re-check
        let to_delete: Vec<(u32, u8)> = model
            .keys()
            .copied()
            .enumerate()
            .filter(|(i, _)| i % 2 == 0)
            .map(|(_, k)| k)
            .collect();
        for (bits, len) in to_delete {
            let prefix = Prefix::new(
                IpAddr::V4(Ipv4Addr::from(bits)),
                len,
            )
            .unwrap();
            let old_t = table.delete(&prefix);
            let old_m = model.remove(&(bits, len));
            assert_eq!(old_t, old_m);
        }
        assert_eq!(table.size(), model.len());

        for _ in 0..2000 {
            let probe: u32 = rng.random();
            let got = table
                .lookup(IpAddr::V4(Ipv4Addr::from(probe)))
                .map(|(p, v)| match p.addr() {
                    IpAddr::V4(a) => ((u32::from(a), p.len()), *v),
                    IpAddr::V6(_) => unreachable!(),
                });
            assert_eq!(got, model_lookup(&model, probe));
        }
    }

    #[test]
    fn test_overlap_symmetry_random() {
        common::init();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut a = Table::new();
            let mut b = Table::new();
            for i in 0..20u32 {
                let len = rng.random_range(0..=28u8);
                let bits: u32 = rng.random::<u32>() & mask4(len);
                let prefix = Prefix::new(
                    IpAddr::V4(Ipv4Addr::from(bits)),
                    len,
                )
                .unwrap();
                if rng.random::<bool>() {
                    a.insert(&prefix, i);
                } else {
                    b.insert(&prefix, i);
                }
            }
            assert_eq!(a.overlaps(&b), b.overlaps(&a));

            // cross-check against the single-prefix overlap test
            let any_pairwise = a
                .all()
                .any(|(p, _)| b.overlaps_prefix(&p));
            assert_eq!(a.overlaps(&b), any_pairwise);
        }
    }
}
