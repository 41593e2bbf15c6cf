#[cfg(test)]
mod demo_config {
    use std::net::Ipv4Addr;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    use netlab::{config_loader, orchestrator, state};

    fn demo(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
    }

    #[test]
    fn test_exam_demo_builds() {
        let config = config_loader::load_config(&demo("exam_lab.yaml")).unwrap();
        let lab = orchestrator::build_lab(&config).unwrap();

        assert_eq!(lab.graph().devices().len(), 11);
        assert_eq!(lab.graph().links().len(), 10);

        let lan_a = lab
            .forest()
            .find_by_cidr(Ipv4Addr::new(192, 168, 1, 32), 27)
            .unwrap();
        assert_eq!(lan_a.name.as_deref(), Some("LAN_A"));
        assert_eq!(lan_a.assigned_interface.as_deref(), Some("Gig0/1.10"));
        assert_eq!(lan_a.dhcp.relay_helper, Some(Ipv4Addr::new(192, 168, 1, 130)));

        let switch0 = lab.graph().device_by_hostname("Switch0").unwrap();
        assert!(switch0.interface("Gig0/1").unwrap().is_trunk);
        assert_eq!(switch0.interface("Fa0/2").unwrap().vlan_id, 20);
    }

    #[test]
    fn test_exam_demo_plan_reloads() {
        let config = config_loader::load_config(&demo("exam_lab.yaml")).unwrap();
        let dir = TempDir::new().unwrap();
        let output = orchestrator::generate_plan(&config, dir.path()).unwrap();

        let lab = state::load(&output.state_path).unwrap();
        assert_eq!(lab.forest().len(), output.summary.subnets.len());
        let router1 = lab.graph().device_by_hostname("Router1").unwrap();
        assert_eq!(router1.static_routes().len(), 2);
        assert_eq!(router1.security.enable_secret, "class");
        assert_eq!(router1.security.vty_password, "admin");
    }
}
