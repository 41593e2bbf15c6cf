#[cfg(test)]
mod lab_scenarios {
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    use netlab::ip;
    use netlab::relay::resolve_relay_address;
    use netlab::state;
    use netlab::subnet::{
        allocate_by_host_count, allocate_by_subnet_count, parse_base_network, Network, Sizing,
        SubnetForest,
    };
    use netlab::topology::{BatchRequest, CableType, DeviceClass, TopologyError, TopologyGraph};
    use netlab::{Lab, LabError};

    fn starts(children: &[Network]) -> Vec<Ipv4Addr> {
        children.iter().map(|c| c.address).collect()
    }

    /// Every split node is exactly covered by its children and every node is
    /// aligned to its own block.
    fn assert_forest_consistent(forest: &SubnetForest) {
        for node in forest.iter() {
            assert!(ip::is_aligned(node.address, node.prefix_length), "{} misaligned", node.cidr());
            if node.is_split {
                let children = forest.children_of(node.id);
                assert!(!children.is_empty());
                let block = children[0].block_size();
                assert_eq!(children.len() as u64 * block, node.block_size());
                for (i, child) in children.iter().enumerate() {
                    assert_eq!(
                        u64::from(u32::from(child.address)),
                        u64::from(u32::from(node.address)) + i as u64 * block
                    );
                    assert_eq!(child.parent_id, Some(node.id));
                }
            }
        }
    }

    #[test]
    fn test_scenario_a_subnet_count() {
        let base = parse_base_network("192.168.1.0/24").unwrap();
        let children = allocate_by_subnet_count(&base, 4).unwrap();
        assert_eq!(
            starts(&children),
            vec![
                Ipv4Addr::new(192, 168, 1, 0),
                Ipv4Addr::new(192, 168, 1, 64),
                Ipv4Addr::new(192, 168, 1, 128),
                Ipv4Addr::new(192, 168, 1, 192),
            ]
        );
    }

    #[test]
    fn test_scenario_b_and_c_recursive_vlsm() {
        let mut forest = SubnetForest::new();
        let roots = forest.plan("192.168.1.0/24", Sizing::Hosts(50)).unwrap();
        assert_eq!(roots.len(), 4);
        assert!(forest.iter().all(|n| n.prefix_length == 26));

        let wans = forest.split_by_hosts(roots[0], 2).unwrap();
        assert_eq!(wans.len(), 16);
        let last = forest.find(wans[15]).unwrap();
        assert_eq!(last.cidr(), "192.168.1.60/30");

        let deeper = forest.split_by_count(roots[3], 2).unwrap();
        assert_eq!(deeper.len(), 2);
        assert_forest_consistent(&forest);

        assert!(allocate_by_host_count(&base_slash(30), 3).is_err());
    }

    fn base_slash(prefix: u8) -> Network {
        parse_base_network(&format!("10.0.0.0/{}", prefix)).unwrap()
    }

    #[test]
    fn test_scenario_d_cable_inference() {
        let mut graph = TopologyGraph::new();
        let r0 = graph.add_device("Router0", DeviceClass::Router).unwrap();
        let r1 = graph.add_device("Router1", DeviceClass::Router).unwrap();
        let sw = graph.add_device("Switch0", DeviceClass::Switch).unwrap();

        let lan = graph.connect(r0, "Gig0/1", sw, "Gig0/1").unwrap();
        let wan = graph.connect(r0, "Se0/1/0", r1, "Se0/1/0").unwrap();
        assert_eq!(graph.link(lan).unwrap().cable_type, CableType::StraightThrough);
        assert_eq!(graph.link(wan).unwrap().cable_type, CableType::Serial);
        assert_eq!(
            graph.infer_cable_type(r0, "Gig0/0", r1, "Gig0/0").unwrap(),
            CableType::Crossover
        );
    }

    #[test]
    fn test_scenario_e_relay_resolution() {
        let mut lab = Lab::new();
        let r0 = lab.add_device("Router0", DeviceClass::Router).unwrap();
        let r1 = lab.add_device("Router1", DeviceClass::Router).unwrap();
        lab.connect(r0, "Se0/1/0", r1, "Se0/1/0").unwrap();

        let lans = lab.plan("192.168.1.0/24", Sizing::Subnets(2)).unwrap();
        let lower = lab.forest_mut().split_by_hosts(lans[1], 2).unwrap();
        // 192.168.1.128/30 is the first /30 of the upper half
        lab.assign_router_interface(lower[0], r0, "Se0/1/0", 0).unwrap();
        lab.assign_router_interface(lans[0], r0, "Gig0/0", 0).unwrap();

        assert_eq!(
            resolve_relay_address(lab.forest(), lab.graph(), r1),
            Some(Ipv4Addr::new(192, 168, 1, 130))
        );
        let helper = lab.enable_relay_dhcp(lans[0], r1, true).unwrap();
        assert_eq!(helper, Ipv4Addr::new(192, 168, 1, 130));
    }

    #[test]
    fn test_connect_disconnect_symmetry() {
        let mut graph = TopologyGraph::new();
        let pc = graph.add_device("PC0", DeviceClass::Pc).unwrap();
        let sw = graph.add_device("Switch0", DeviceClass::Switch).unwrap();

        let link = graph.connect(pc, "Fa0", sw, "Fa0/1").unwrap();
        let pc_port = graph.device(pc).unwrap().interface("Fa0").unwrap();
        assert_eq!(pc_port.neighbor.as_ref().unwrap().device, sw);
        let sw_port = graph.device(sw).unwrap().interface("Fa0/1").unwrap();
        assert_eq!(sw_port.neighbor.as_ref().unwrap().port, "Fa0");
        assert_eq!(graph.links_between(pc, sw).len(), 1);

        graph.disconnect(link).unwrap();
        assert!(!graph.device(pc).unwrap().interface("Fa0").unwrap().is_connected());
        assert!(!graph.device(sw).unwrap().interface("Fa0/1").unwrap().is_connected());
        assert!(graph.links().is_empty());
    }

    #[test]
    fn test_failed_connect_leaves_no_ports() {
        let mut graph = TopologyGraph::new();
        let pc0 = graph.add_device("PC0", DeviceClass::Pc).unwrap();
        let pc1 = graph.add_device("PC1", DeviceClass::Pc).unwrap();
        let sw = graph.add_device("Switch0", DeviceClass::Switch).unwrap();
        graph.connect(pc0, "Fa0", sw, "Fa0/1").unwrap();

        let err = graph.connect(pc1, "Eth9", sw, "Fa0/1").unwrap_err();
        assert!(matches!(err, TopologyError::PortBusy { .. }));
        assert!(graph.device(pc1).unwrap().interface("Eth9").is_none());
    }

    #[test]
    fn test_batch_connect_stops_on_busy_target_port() {
        let mut lab = Lab::new();
        let sw = lab.add_device("Switch0", DeviceClass::Switch).unwrap();
        let pcs: Vec<_> = (0..4)
            .map(|i| lab.add_device(&format!("PC{}", i), DeviceClass::Pc).unwrap())
            .collect();
        lab.connect(pcs[3], "Fa0", sw, "Fa0/3").unwrap();

        let outcome = lab
            .connect_batch(&BatchRequest {
                sources: vec![sw, pcs[0], pcs[1], pcs[2]],
                target: sw,
                start_target_port: Some("Fa0/1".to_string()),
                source_port: None,
            })
            .unwrap();

        assert_eq!(outcome.connected.len(), 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(matches!(outcome.skipped[0].1, TopologyError::SelfLink { .. }));
        assert!(matches!(outcome.stopped, Some(TopologyError::PortBusy { .. })));
        assert!(!lab.graph().device(pcs[2]).unwrap().interface("Fa0").unwrap().is_connected());
    }

    #[test]
    fn test_deletion_safety() {
        let mut lab = Lab::exam_template().unwrap();
        let switch0 = lab.device_id("Switch0").unwrap();
        let router0 = lab.device_id("Router0").unwrap();

        let report = lab.delete_device(switch0).unwrap();
        assert_eq!(report.cables_removed, 4);
        assert!(lab.graph().links().iter().all(|l| !l.involves(switch0)));
        for device in lab.graph().devices() {
            assert!(device
                .ports
                .iter()
                .all(|p| p.neighbor.as_ref().map_or(true, |n| n.device != switch0)));
        }

        let report = lab.delete_device(router0).unwrap();
        assert_eq!(report.subnets_released.len(), 3);
        assert!(lab.forest().iter().all(|n| n.assignment.owner() != Some(router0)));
        assert!(matches!(
            lab.delete_device(router0),
            Err(LabError::Topology(TopologyError::InvalidReference { .. }))
        ));
    }

    #[test]
    fn test_vlan_deletion_resets_ports() {
        let mut lab = Lab::exam_template().unwrap();
        let reset = lab.delete_vlan(10).unwrap();
        assert_eq!(reset, 2);
        let switch2 = lab.graph().device_by_hostname("Switch2").unwrap();
        assert_eq!(switch2.interface("Fa0/1").unwrap().vlan_id, 1);
        assert_eq!(switch2.interface("Fa0/2").unwrap().vlan_id, 20);
        assert!(!lab.vlans().exists(10));
    }

    #[test]
    fn test_exam_template_relay() {
        let lab = Lab::exam_template().unwrap();
        let router1 = lab.device_id("Router1").unwrap();
        assert_eq!(
            resolve_relay_address(lab.forest(), lab.graph(), router1),
            Some(Ipv4Addr::new(192, 168, 1, 130))
        );
        for cidr in [[192, 168, 1, 32], [192, 168, 1, 64]] {
            let net = lab.forest().find_by_cidr(Ipv4Addr::from(cidr), 27).unwrap();
            assert!(net.dhcp.is_relayed());
            assert_eq!(net.dhcp.server, Some(router1));
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lab.dat");

        let mut lab = Lab::exam_template().unwrap();
        let router0 = lab.device_id("Router0").unwrap();
        lab.add_static_route(
            router0,
            Ipv4Addr::new(192, 168, 1, 96),
            Ipv4Addr::new(255, 255, 255, 224),
            Ipv4Addr::new(192, 168, 1, 130),
        )
        .unwrap();
        state::save(&lab, &path).unwrap();

        let loaded = state::load(&path).unwrap();
        assert_eq!(loaded.graph().devices(), lab.graph().devices());
        let cables = |l: &Lab| -> Vec<CableType> {
            l.graph().links().iter().map(|k| k.cable_type).collect()
        };
        assert_eq!(cables(&loaded), cables(&lab));
        assert_eq!(loaded.vlans(), lab.vlans());
        assert!(loaded.forest().iter().eq(lab.forest().iter()));
        assert_forest_consistent(loaded.forest());
    }

    #[test]
    fn test_separator_names_never_reach_the_save_file() {
        let mut lab = Lab::new();
        let router0 = lab.add_device("Router0", DeviceClass::Router).unwrap();
        let ids = lab.plan("192.168.1.0/24", Sizing::Subnets(2)).unwrap();

        assert!(lab.forest_mut().rename(ids[0], Some("LAN|A".to_string())).is_err());
        assert!(lab.define_vlan(10, "Staff|1").is_err());
        assert!(lab.add_device("Edge|0", DeviceClass::Router).is_err());
        assert!(lab.assign_router_interface(ids[1], router0, "Gig0/0|1", 0).is_err());

        lab.forest_mut().rename(ids[0], Some("LAN A".to_string())).unwrap();
        lab.define_vlan(10, "Staff 1").unwrap();
        lab.assign_router_interface(ids[0], router0, "Gig0/0", 0).unwrap();

        let loaded = state::load_from_str(&state::save_to_string(&lab)).unwrap();
        let net = loaded.forest().find(ids[0]).unwrap();
        assert_eq!(net.name.as_deref(), Some("LAN A"));
        assert_eq!(net.assignment.owner(), loaded.device_id("Router0"));
        assert_eq!(net.assigned_interface.as_deref(), Some("Gig0/0"));
        assert_eq!(loaded.vlans().name_of(10), Some("Staff 1"));
        assert!(loaded.forest().find(ids[1]).unwrap().assignment.is_free());
    }
}
