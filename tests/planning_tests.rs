// Integration tests for diskplan
//
// End-to-end scenarios through the public API: build a device tree, register
// actions, schedule them and apply the plan against the fake platform.

use diskplan::backend::{BackendCall, DeviceInfo, FakePlatform};
use diskplan::{
    Action, ActionError, ActionFilter, ActionKind, ActionQueue, ActionType, Device, DeviceId,
    DeviceKind, DeviceTree, DiskPlanError, ExecutionWarning, Executor, Format, FormatKind, Plan,
    PlanError, Size, order,
};

/// Existing 100 GiB disk with an existing, resizable ext4 partition
/// (sda1) and room for two planned partitions (sda2, sda3)
fn workstation() -> (DeviceTree, DeviceId, DeviceId, DeviceId) {
    let mut tree = DeviceTree::new();
    let sda = tree
        .add(Device::builder("sda", DeviceKind::Disk).exists(true).size(Size::gib(100)))
        .expect("disk");
    let sda1 = tree
        .add(
            Device::builder("sda1", DeviceKind::Partition { number: 1 })
                .parent(sda)
                .exists(true)
                .resizable(true)
                .size(Size::gib(60))
                .bounds(Size::gib(10), Size::gib(100))
                .format(
                    Format::existing(FormatKind::Ext4, Size::gib(60))
                        .with_bounds(Size::gib(10), Size::gib(100)),
                ),
        )
        .expect("sda1");
    let sda2 = tree
        .add(
            Device::builder("sda2", DeviceKind::Partition { number: 2 })
                .parent(sda)
                .size(Size::gib(20)),
        )
        .expect("sda2");
    let sda3 = tree
        .add(
            Device::builder("sda3", DeviceKind::Partition { number: 3 })
                .parent(sda)
                .size(Size::gib(20)),
        )
        .expect("sda3");
    (tree, sda1, sda2, sda3)
}

#[test]
fn test_shrink_and_add_partitions() -> Result<(), DiskPlanError> {
    let (mut tree, sda1, sda2, sda3) = workstation();
    let mut queue = ActionQueue::new();

    // registered in an order the scheduler has to fix
    let mkfs3 = Action::create_format(&mut tree, sda3, Format::new(FormatKind::Xfs))?;
    queue.register(&mut tree, mkfs3)?;
    let create3 = Action::create_device(&tree, sda3)?;
    queue.register(&mut tree, create3)?;
    let create2 = Action::create_device(&tree, sda2)?;
    queue.register(&mut tree, create2)?;
    let shrink = Action::resize_device(&mut tree, sda1, Size::gib(40))?;
    queue.register(&mut tree, shrink)?;
    let shrink_fs = Action::resize_format(&mut tree, sda1, Size::gib(40))?;
    queue.register(&mut tree, shrink_fs)?;
    let swap = Action::create_format(&mut tree, sda2, Format::new(FormatKind::Swap))?;
    queue.register(&mut tree, swap)?;

    let plan = queue.into_plan(&tree)?;
    let steps: Vec<String> = plan
        .actions()
        .iter()
        .map(|a| format!("{} {}", a.type_desc(), a.device_name()))
        .collect();

    let pos = |step: &str| steps.iter().position(|s| s == step).expect(step);
    assert!(pos("resize format sda1") < pos("resize device sda1"));
    assert!(pos("create device sda2") < pos("create device sda3"));
    assert!(pos("create device sda2") < pos("create format sda2"));
    assert!(pos("create device sda3") < pos("create format sda3"));

    let mut platform = FakePlatform::new();
    platform.events.insert(
        "/dev/sda2",
        DeviceInfo {
            uuid: Some("swap-uuid".to_string()),
            links: vec!["/dev/disk/by-uuid/swap-uuid".to_string()],
        },
    );
    platform.events.insert("/dev/sda3", DeviceInfo::default());

    let report = Executor::new(&mut platform).apply(&mut tree, &plan)?;
    assert_eq!(report.executed.len(), 6);
    assert!(report.warnings.is_empty());

    assert_eq!(tree.device(sda1)?.current_size, Size::gib(40));
    assert_eq!(tree.format_of(sda1)?.current_size, Size::gib(40));
    assert_eq!(tree.format_of(sda2)?.uuid.as_deref(), Some("swap-uuid"));
    assert!(tree.device(sda3)?.exists);
    assert!(platform
        .backend
        .calls()
        .contains(&BackendCall::SetSystem("sda2".to_string(), 0x82)));
    Ok(())
}

#[test]
fn test_destroying_planned_device_is_net_zero() -> Result<(), DiskPlanError> {
    let (mut tree, _, sda2, _) = workstation();
    let before = tree.device(sda2)?.format;
    let mut queue = ActionQueue::new();

    let create = Action::create_device(&tree, sda2)?;
    queue.register(&mut tree, create)?;
    let mkfs = Action::create_format(&mut tree, sda2, Format::new(FormatKind::Ext4))?;
    queue.register(&mut tree, mkfs)?;

    let destroy = Action::destroy_device(&tree, sda2)?;
    let reg = queue.register(&mut tree, destroy)?;

    assert_eq!(reg.inserted, None);
    assert_eq!(reg.obsoleted.len(), 2);
    assert!(queue.is_empty());
    assert_eq!(tree.device(sda2)?.format, before);
    Ok(())
}

#[test]
fn test_successive_resizes_keep_latest() -> Result<(), DiskPlanError> {
    let (mut tree, sda1, ..) = workstation();
    let mut queue = ActionQueue::new();

    for gib in [50, 30, 45] {
        let resize = Action::resize_device(&mut tree, sda1, Size::gib(gib))?;
        queue.register(&mut tree, resize)?;
    }

    let resizes = queue.find(&ActionFilter::new().device(sda1).action_type(ActionType::Resize));
    assert_eq!(resizes.len(), 1);
    assert_eq!(tree.device(sda1)?.target_size, Size::gib(45));

    queue.cancel_all(&mut tree)?;
    assert_eq!(tree.device(sda1)?.target_size, Size::gib(60));
    Ok(())
}

#[test]
fn test_partition_order_on_one_disk() {
    let (tree, _, sda2, sda3) = workstation();

    let creates = vec![
        Action::create_device(&tree, sda3).expect("create"),
        Action::create_device(&tree, sda2).expect("create"),
    ];
    assert!(creates[0].requires(&creates[1], &tree));
    assert!(!creates[1].requires(&creates[0], &tree));
    let names: Vec<&str> = order(&creates, &tree)
        .expect("order")
        .iter()
        .map(|a| a.device_name())
        .collect();
    assert_eq!(names, vec!["sda2", "sda3"]);

    let destroys = vec![
        Action::destroy_device(&tree, sda2).expect("destroy"),
        Action::destroy_device(&tree, sda3).expect("destroy"),
    ];
    assert!(destroys[0].requires(&destroys[1], &tree));
    let names: Vec<&str> = order(&destroys, &tree)
        .expect("order")
        .iter()
        .map(|a| a.device_name())
        .collect();
    assert_eq!(names, vec!["sda3", "sda2"]);
}

#[test]
fn test_invalid_resizes_rejected() {
    let (mut tree, sda1, ..) = workstation();
    for (size, expected) in [
        (Size::gib(60), "same"),
        (Size::gib(5), "too small"),
        (Size::gib(200), "too large"),
    ] {
        let err = Action::resize_device(&mut tree, sda1, size).expect_err("rejected");
        assert!(err.to_string().contains(expected), "{}", err);
    }
    assert!(matches!(
        Action::resize_format(&mut tree, sda1, Size::gib(60)),
        Err(ActionError::SizeUnchanged(_))
    ));
}

#[test]
fn test_destroying_new_format_keeps_wipe_of_existing() -> Result<(), DiskPlanError> {
    let (mut tree, sda1, ..) = workstation();
    let mut queue = ActionQueue::new();

    let wipe = Action::destroy_format(&mut tree, sda1)?;
    let wipe_id = wipe.id();
    queue.register(&mut tree, wipe)?;
    let mkfs = Action::create_format(&mut tree, sda1, Format::new(FormatKind::Btrfs))?;
    queue.register(&mut tree, mkfs)?;

    // destroying the planned btrfs drops it and itself, not the wipe of ext4
    let undo = Action::destroy_format(&mut tree, sda1)?;
    let reg = queue.register(&mut tree, undo)?;
    assert_eq!(reg.inserted, None);
    assert_eq!(reg.obsoleted.len(), 1);
    assert_eq!(queue.len(), 1);
    assert!(queue.get(wipe_id).is_some());
    assert_eq!(tree.format_of(sda1)?.kind, FormatKind::None);
    Ok(())
}

#[test]
fn test_descriptor_lookup_failure_by_format() -> Result<(), DiskPlanError> {
    let mut tree = DeviceTree::new();
    let scratch = tree.add(Device::builder("scratch", DeviceKind::Other).exists(true))?;
    let data = tree.add(Device::builder("data", DeviceKind::Other).exists(true))?;

    let mut queue = ActionQueue::new();
    let tmpfs = Action::create_format(&mut tree, scratch, Format::new(FormatKind::Tmpfs))?;
    queue.register(&mut tree, tmpfs)?;
    let xfs = Action::create_format(&mut tree, data, Format::new(FormatKind::Xfs))?;
    let xfs_id = xfs.id();
    queue.register(&mut tree, xfs)?;

    let plan = queue.into_plan(&tree)?;
    let mut platform = FakePlatform::new();
    let report = Executor::new(&mut platform).apply(&mut tree, &plan)?;

    assert_eq!(report.executed.len(), 2);
    assert_eq!(
        report.warnings,
        vec![ExecutionWarning::DescriptorLookup {
            action: xfs_id,
            device: "data".to_string(),
            format: FormatKind::Xfs,
        }]
    );
    assert!(tree.format_of(scratch)?.exists);
    Ok(())
}

#[test]
fn test_lvm_teardown_order() -> Result<(), DiskPlanError> {
    let (mut tree, sda1, ..) = workstation();
    let vg = tree.add(
        Device::builder("vg0", DeviceKind::LvmVolumeGroup)
            .parent(sda1)
            .exists(true),
    )?;
    let lv = tree.add(
        Device::builder("vg0-home", DeviceKind::LvmLogicalVolume { single_pv: false })
            .parent(vg)
            .exists(true)
            .format(Format::existing(FormatKind::Xfs, Size::gib(40))),
    )?;

    let mut queue = ActionQueue::new();
    let remove_vg = Action::destroy_device(&tree, vg)?;
    queue.register(&mut tree, remove_vg)?;
    let remove_lv = Action::destroy_device(&tree, lv)?;
    queue.register(&mut tree, remove_lv)?;
    let wipe_lv = Action::destroy_format(&mut tree, lv)?;
    queue.register(&mut tree, wipe_lv)?;

    let plan = queue.into_plan(&tree)?;
    let kinds: Vec<(ActionKind, &str)> = plan
        .actions()
        .iter()
        .map(|a| (a.kind(), a.device_name()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (ActionKind::DestroyFormat, "vg0-home"),
            (ActionKind::DestroyDevice, "vg0-home"),
            (ActionKind::DestroyDevice, "vg0"),
        ]
    );
    assert!(plan.is_destructive());
    Ok(())
}

#[test]
fn test_cycle_is_reported_and_queue_kept() {
    let (mut tree, sda1, ..) = workstation();
    let vg = tree
        .add(Device::builder("vg0", DeviceKind::LvmVolumeGroup).parent(sda1))
        .expect("vg");

    // growing the parent and shrinking the child each require the other
    let grow_parent = Action::resize_device(&mut tree, sda1, Size::gib(80)).expect("grow");
    tree.device_mut(vg).expect("vg").resizable = true;
    tree.device_mut(vg).expect("vg").max_size = Size::gib(100);
    tree.device_mut(vg).expect("vg").current_size = Size::gib(50);
    let shrink_child = Action::resize_device(&mut tree, vg, Size::gib(30)).expect("shrink");
    assert!(shrink_child.requires(&grow_parent, &tree));
    assert!(grow_parent.requires(&shrink_child, &tree));

    let mut expected = vec![grow_parent.id(), shrink_child.id()];
    expected.sort();

    let mut queue = ActionQueue::new();
    queue.register(&mut tree, grow_parent).expect("register");
    queue.register(&mut tree, shrink_child).expect("register");

    let err = queue.into_plan(&tree).expect_err("cycle");
    assert_eq!(err, PlanError::Cycle { remaining: expected });
    assert_eq!(queue.len(), 2);

    let actions: Vec<Action> = queue.actions().to_vec();
    assert!(Plan::schedule(actions, &tree).is_err());
}

#[test]
fn test_partial_failure_reports_progress() {
    let (mut tree, sda1, sda2, _) = workstation();
    let mut queue = ActionQueue::new();
    let shrink_fs = Action::resize_format(&mut tree, sda1, Size::gib(30)).expect("fs");
    queue.register(&mut tree, shrink_fs).expect("register");
    let shrink = Action::resize_device(&mut tree, sda1, Size::gib(30)).expect("dev");
    queue.register(&mut tree, shrink).expect("register");
    let create = Action::create_device(&tree, sda2).expect("create");
    queue.register(&mut tree, create).expect("register");
    let plan = queue.into_plan(&tree).expect("plan");

    let mut platform = FakePlatform::new();
    platform
        .backend
        .fail_on(BackendCall::ResizeDevice("sda1".to_string(), Size::gib(30)));
    let err = Executor::new(&mut platform)
        .apply(&mut tree, &plan)
        .expect_err("fails");

    assert_eq!(err.completed.len() + 1 + err.pending.len(), plan.len());
    // the filesystem shrink already happened and stays
    assert_eq!(tree.format_of(sda1).map(|f| f.current_size), Ok(Size::gib(30)));
    assert_eq!(tree.device(sda1).map(|d| d.current_size), Ok(Size::gib(60)));
    let wrapped: DiskPlanError = err.into();
    assert!(wrapped.to_string().starts_with("Execution error: action"));
}
