//! Current injection from instance power.

use tracing::debug;

use crate::design::{InstancePower, Net, NetKind, Point};
use crate::error::{IrError, Result};
use crate::mesh::{GMat, NodeIdx};

/// Where an instance draws its current from.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceTap {
    pub name: String,
    pub loc: Point,
    pub node: NodeIdx,
}

/// Outcome of current injection.
#[derive(Debug, Clone, Default)]
pub struct Injection {
    /// Every connected instance with its mesh node, including zero-power ones
    pub taps: Vec<InstanceTap>,
    /// Sum of injected currents (A), signed
    pub total_current: f64,
    /// Instances whose current landed on a source node and was dropped
    pub on_sources: usize,
}

/// Inject `power / supply` for every instance connected to `net` into the
/// nearest bottom-level node under the instance center.
///
/// Loads draw current out of a power net (negative injection) and push it
/// into a ground net (positive injection). Contributions accumulate; source
/// nodes never carry current.
pub fn inject_currents(gmat: &mut GMat, net: &Net, instances: &[InstancePower], supply: f64) -> Result<Injection> {
    if !(supply.is_finite() && supply > 0.0) {
        return Err(IrError::config(format!(
            "supply voltage for current of net '{}' must be positive, got {} V",
            net.name, supply
        )));
    }
    let Some(bottom) = gmat.bottom_level() else {
        return Ok(Injection::default());
    };
    let sign = match net.kind {
        NetKind::Power => -1.0,
        NetKind::Ground => 1.0,
    };

    let mut injection = Injection::default();
    for inst in instances.iter().filter(|i| i.connects_to(&net.name)) {
        if !inst.power.is_finite() {
            return Err(IrError::config(format!("instance '{}' has non-finite power", inst.name)));
        }
        let loc = inst.bbox.center();
        let Some(idx) = gmat.nearest_node(bottom, loc) else {
            continue;
        };
        injection.taps.push(InstanceTap {
            name: inst.name.clone(),
            loc,
            node: idx,
        });
        if inst.power == 0.0 {
            continue;
        }

        let node = gmat.node_mut(idx);
        if node.is_source() {
            injection.on_sources += 1;
            continue;
        }
        let current = sign * inst.power / supply;
        node.current += current;
        injection.total_current += current;
    }

    debug!(
        instances = injection.taps.len(),
        total_current = injection.total_current,
        on_sources = injection.on_sources,
        "injected load currents"
    );
    Ok(injection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{Design, LayoutProvider, PowerProvider, Rect};
    use crate::mesh::MeshBuilder;
    use approx::assert_relative_eq;

    const DESIGN: &str = "\
.layer M1 level=1 res=0.1
.net VDD power 1.0
.net VSS ground
.wire VDD M1 0 0 1000 10
.wire VSS M1 0 100 1000 110
.inst a 0 0 20 20 0.5
.inst b 10 0 30 20 0.25
.inst c 950 0 1000 10 0.0
.inst d 500 0 520 10 1.0 net=VSS
";

    fn inst(design: &Design) -> Vec<InstancePower> {
        design.instance_powers(None)
    }

    #[test]
    fn test_power_net_loads_are_negative_and_accumulate() {
        let design = Design::parse(DESIGN).unwrap();
        let vdd = design.net("VDD").cloned().unwrap();
        let mut gmat = MeshBuilder::new(&design, "VDD", 500).build().unwrap();
        let inj = inject_currents(&mut gmat, &vdd, &inst(&design), 1.0).unwrap();

        // a and b share the node at x=0, c has no power, d is on VSS
        assert_eq!(inj.taps.len(), 3);
        assert_relative_eq!(inj.total_current, -0.75, epsilon = 1e-12);
        let n0 = gmat.find_node(1, Point::new(0, 5)).unwrap();
        assert_relative_eq!(gmat.node(n0).current, -0.75, epsilon = 1e-12);
        assert_eq!(gmat.load_nodes().count(), 1);
    }

    #[test]
    fn test_ground_net_loads_are_positive() {
        let design = Design::parse(DESIGN).unwrap();
        let vss = design.net("VSS").cloned().unwrap();
        let mut gmat = MeshBuilder::new(&design, "VSS", 500).build().unwrap();
        let inj = inject_currents(&mut gmat, &vss, &inst(&design), 2.0).unwrap();
        // a, b and c connect to every net; d only to VSS
        assert_eq!(inj.taps.len(), 4);
        assert_relative_eq!(inj.total_current, (0.5 + 0.25 + 1.0) / 2.0, epsilon = 1e-12);
        assert!(gmat.load_nodes().all(|n| n.current > 0.0));
    }

    #[test]
    fn test_source_nodes_receive_no_current() {
        let design = Design::parse(DESIGN).unwrap();
        let vdd = design.net("VDD").cloned().unwrap();
        let mut gmat = MeshBuilder::new(&design, "VDD", 500).build().unwrap();
        let n0 = gmat.find_node(1, Point::new(0, 5)).unwrap();
        gmat.node_mut(n0).source = Some(1.0);

        let inj = inject_currents(&mut gmat, &vdd, &inst(&design), 1.0).unwrap();
        assert_eq!(inj.on_sources, 2);
        assert_eq!(gmat.node(n0).current, 0.0);
        assert_eq!(inj.total_current, 0.0);
    }

    #[test]
    fn test_invalid_supply_rejected() {
        let design = Design::parse(DESIGN).unwrap();
        let vdd = design.net("VDD").cloned().unwrap();
        let mut gmat = MeshBuilder::new(&design, "VDD", 500).build().unwrap();
        assert!(inject_currents(&mut gmat, &vdd, &[], 0.0).unwrap_err().is_config());
        let mut far = inst(&design);
        far.push(InstancePower {
            name: "bad".into(),
            bbox: Rect::new(0, 0, 1, 1),
            nets: vec![],
            power: f64::NAN,
        });
        assert!(inject_currents(&mut gmat, &vdd, &far, 1.0).is_err());
    }
}
