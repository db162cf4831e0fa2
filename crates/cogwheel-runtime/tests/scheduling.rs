//! End-to-end scheduling scenarios driven through the public API.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cogwheel_runtime::{
    Clock, Command, CommandGroup, CommandState, HookError, ManualClock, ResourceId,
    ScheduledCommand, Scheduler, SchedulerConfig, pace_delay,
};

type Journal = Arc<Mutex<Vec<String>>>;

/// Journals every hook; finishes after `steps` executes (never if `None`).
struct Tracked {
    label: &'static str,
    steps: Option<usize>,
    done: usize,
    journal: Journal,
}

impl Tracked {
    fn new(label: &'static str, steps: Option<usize>, journal: &Journal) -> Self {
        Self {
            label,
            steps,
            done: 0,
            journal: Arc::clone(journal),
        }
    }

    fn log(&self, hook: &str) {
        self.journal.lock().unwrap().push(format!("{}:{hook}", self.label));
    }
}

impl Command for Tracked {
    fn name(&self) -> &str {
        self.label
    }
    fn initialize(&mut self) -> Result<(), HookError> {
        self.log("init");
        Ok(())
    }
    fn execute(&mut self) -> Result<(), HookError> {
        self.done += 1;
        self.log("exec");
        Ok(())
    }
    fn is_finished(&mut self) -> Result<bool, HookError> {
        Ok(self.steps.is_some_and(|n| self.done >= n))
    }
    fn end(&mut self) -> Result<(), HookError> {
        self.log("end");
        Ok(())
    }
    fn interrupted(&mut self) {
        self.log("interrupted");
    }
}

fn rig() -> (Scheduler, ManualClock) {
    let clock = ManualClock::new();
    let scheduler = Scheduler::with_clock(SchedulerConfig::default(), Arc::new(clock.clone()));
    (scheduler, clock)
}

fn count(journal: &Journal, entry: &str) -> usize {
    journal.lock().unwrap().iter().filter(|e| *e == entry).count()
}

fn index(journal: &Journal, entry: &str) -> usize {
    journal
        .lock()
        .unwrap()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} never happened"))
}

#[test]
fn sequential_stage_finishes_before_parallel_stage_starts() {
    let (mut s, clock) = rig();
    let journal: Journal = Arc::default();

    let mut group = CommandGroup::new("auto");
    group
        .add_sequential(ScheduledCommand::new(Tracked::new("a", Some(2), &journal)))
        .add_parallel([
            ScheduledCommand::new(Tracked::new("b", Some(1), &journal)),
            ScheduledCommand::new(Tracked::new("c", Some(3), &journal)),
        ]);
    let id = s.schedule(group).unwrap();

    let mut done = false;
    for _ in 0..20 {
        if s.tick().completed.contains(&id) {
            done = true;
            break;
        }
        clock.advance(Duration::from_millis(20));
    }
    assert!(done, "group never completed");

    let a_end = index(&journal, "a:end");
    assert!(a_end < index(&journal, "b:init"));
    assert!(a_end < index(&journal, "c:init"));
    assert_eq!(journal.lock().unwrap().last().map(String::as_str), Some("c:end"));
    assert_eq!(s.state(id), Some(CommandState::Idle));
}

#[test]
fn overlapping_requirements_are_mutually_exclusive() {
    let (mut s, _) = rig();
    let journal: Journal = Arc::default();
    let gripper = s.register_resource("gripper");
    let lifter = s.register_resource("lifter");

    let x = s
        .schedule(ScheduledCommand::new(Tracked::new("x", None, &journal)).requires(gripper))
        .unwrap();
    let y = s.add(
        ScheduledCommand::new(Tracked::new("y", None, &journal)).requiring([lifter, gripper]),
    );

    let err = s.start(y).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(s.state(y), Some(CommandState::Idle));
    assert!(!s.resources().get(lifter).unwrap().is_locked());
    assert_eq!(s.resources().get(gripper).unwrap().holder(), Some(x));
    assert_eq!(count(&journal, "y:init"), 0);

    s.tick();
    assert!(s.is_active(x));
    assert_eq!(count(&journal, "x:exec"), 1);
}

#[test]
fn cancel_twice_equals_cancel_once() {
    let journal: Journal = Arc::default();
    let run = |cancels: usize| {
        let (mut s, _) = rig();
        let r = s.register_resource("gripper");
        let id = s
            .schedule(ScheduledCommand::new(Tracked::new("c", None, &journal)).requires(r))
            .unwrap();
        for _ in 0..cancels {
            s.cancel(id).unwrap();
        }
        let report = s.tick();
        (report.completed, s.state(id), s.resources().get(r).unwrap().is_locked(), id)
    };

    let (once, state_once, locked_once, id1) = run(1);
    let (twice, state_twice, locked_twice, id2) = run(2);
    assert_eq!(once, vec![id1]);
    assert_eq!(twice, vec![id2]);
    assert_eq!(state_once, state_twice);
    assert_eq!(locked_once, locked_twice);
    assert_eq!(count(&journal, "c:interrupted"), 2);
}

#[test]
fn suspended_command_resumes_without_reinitializing() {
    let (mut s, clock) = rig();
    let journal: Journal = Arc::default();
    let r = s.register_resource("gripper");

    let p = s
        .schedule(
            ScheduledCommand::new(Tracked::new("p", None, &journal))
                .requires(r)
                .persistent(true),
        )
        .unwrap();
    s.tick();
    clock.advance(Duration::from_millis(20));

    s.cancel(p).unwrap();
    let report = s.tick();
    assert_eq!(report.suspended, vec![p]);
    assert!(!s.resources().get(r).unwrap().is_locked());

    // Another command borrows the gripper and gives it back.
    let q = s
        .schedule(ScheduledCommand::new(Tracked::new("q", Some(1), &journal)).requires(r))
        .unwrap();
    clock.advance(Duration::from_millis(20));
    s.tick(); // q executes
    clock.advance(Duration::from_millis(20));
    let report = s.tick(); // q finishes and releases
    assert_eq!(report.completed, vec![q]);

    clock.advance(Duration::from_millis(20));
    s.tick(); // p notices the release and resumes
    assert_eq!(s.state(p), Some(CommandState::Running));
    assert!(!s.interrupt_handle(p).unwrap().is_set());

    clock.advance(Duration::from_millis(20));
    s.tick();
    assert_eq!(count(&journal, "p:init"), 1);
    assert_eq!(count(&journal, "p:exec"), 2);
    assert_eq!(s.resources().get(r).unwrap().holder(), Some(p));
}

/// Let another command take `resource` for one step and hand it back.
fn borrow_and_return(
    s: &mut Scheduler,
    clock: &ManualClock,
    resource: ResourceId,
    journal: &Journal,
) {
    let borrower = ScheduledCommand::new(Tracked::new("borrower", Some(1), journal));
    let borrower = s.schedule(borrower.requires(resource)).unwrap();
    let mut returned = false;
    for _ in 0..3 {
        clock.advance(Duration::from_millis(20));
        if s.tick().completed.contains(&borrower) {
            returned = true;
            break;
        }
    }
    assert!(returned, "borrower never finished");
    s.remove(borrower).unwrap();
}

#[test]
fn multi_requirement_command_survives_repeated_suspensions() {
    let (mut s, clock) = rig();
    let journal: Journal = Arc::default();
    let gripper = s.register_resource("gripper");
    let lifter = s.register_resource("lifter");
    let p = s
        .schedule(
            ScheduledCommand::new(Tracked::new("p", None, &journal))
                .requiring([gripper, lifter])
                .persistent(true),
        )
        .unwrap();
    s.tick();

    for round in 1..=2 {
        s.cancel(p).unwrap();
        clock.advance(Duration::from_millis(20));
        assert_eq!(s.tick().suspended, vec![p], "round {round}");

        // Only the lifter is touched; the gripper stays free throughout.
        borrow_and_return(&mut s, &clock, lifter, &journal);
        clock.advance(Duration::from_millis(20));
        s.tick();
        assert_eq!(s.state(p), Some(CommandState::Running), "round {round}");
        assert_eq!(s.resources().get(gripper).unwrap().holder(), Some(p));
        assert_eq!(s.resources().get(lifter).unwrap().holder(), Some(p));
    }
    assert_eq!(count(&journal, "p:init"), 1);
    assert_eq!(count(&journal, "p:interrupted"), 2);
}

#[test]
fn cancelling_a_resumed_command_again_keeps_it_suspended() {
    let (mut s, clock) = rig();
    let journal: Journal = Arc::default();
    let gripper = s.register_resource("gripper");
    let lifter = s.register_resource("lifter");
    let p = s
        .schedule(
            ScheduledCommand::new(Tracked::new("p", None, &journal))
                .requiring([gripper, lifter])
                .persistent(true),
        )
        .unwrap();
    s.tick();
    s.cancel(p).unwrap();
    s.tick();

    borrow_and_return(&mut s, &clock, gripper, &journal);
    clock.advance(Duration::from_millis(20));
    s.tick();
    assert_eq!(s.state(p), Some(CommandState::Running));

    s.cancel(p).unwrap();
    for _ in 0..5 {
        clock.advance(Duration::from_millis(20));
        s.tick();
        assert_eq!(s.state(p), Some(CommandState::Suspended));
    }
    assert!(s.interrupt_handle(p).unwrap().is_set());
    assert!(s.resources().all_free(&[gripper, lifter]));
}

#[test]
fn persistent_group_with_disjoint_members_completes_after_resume() {
    let (mut s, clock) = rig();
    let journal: Journal = Arc::default();
    let gripper = s.register_resource("gripper");
    let lifter = s.register_resource("lifter");

    let mut group = CommandGroup::new("stow").persistent(true);
    group.add_parallel([
        ScheduledCommand::new(Tracked::new("grip", Some(3), &journal))
            .requires(gripper)
            .persistent(true),
        ScheduledCommand::new(Tracked::new("lift", Some(3), &journal))
            .requires(lifter)
            .persistent(true),
    ]);
    let g = s.schedule(group).unwrap();

    s.cancel(g).unwrap();
    assert_eq!(s.tick().suspended, vec![g]);

    // Nobody ever touches the lifter.
    borrow_and_return(&mut s, &clock, gripper, &journal);

    let mut done = false;
    for _ in 0..20 {
        clock.advance(Duration::from_millis(20));
        if s.tick().completed.contains(&g) {
            done = true;
            break;
        }
    }
    assert!(done, "group never completed");
    assert!(s.resources().all_free(&[gripper, lifter]));
    assert_eq!(count(&journal, "grip:init"), 1);
    assert_eq!(count(&journal, "lift:init"), 1);
    assert_eq!(count(&journal, "lift:end"), 1);
}

#[test]
fn stopping_a_suspended_command_leaves_no_waiters_behind() {
    let (mut s, clock) = rig();
    let journal: Journal = Arc::default();
    let gripper = s.register_resource("gripper");
    let lifter = s.register_resource("lifter");
    let p = s
        .schedule(
            ScheduledCommand::new(Tracked::new("p", None, &journal))
                .requiring([gripper, lifter])
                .persistent(true),
        )
        .unwrap();
    s.cancel(p).unwrap();
    s.tick();

    s.stop(p).unwrap();
    borrow_and_return(&mut s, &clock, gripper, &journal);
    assert_eq!(s.resources().get(gripper).unwrap().waiter_count(), 0);
    assert_eq!(s.resources().get(lifter).unwrap().waiter_count(), 0);
    assert!(!s.resources_mut().take_notification(p));
}

/// Records when each `execute` started and pretends to work for `work`.
struct Busy {
    clock: ManualClock,
    work: Duration,
    starts: Arc<Mutex<Vec<Instant>>>,
}

impl Command for Busy {
    fn execute(&mut self) -> Result<(), HookError> {
        self.starts.lock().unwrap().push(self.clock.now());
        self.clock.advance(self.work);
        Ok(())
    }
}

fn execute_gaps(work: Duration) -> Vec<Duration> {
    let (mut s, clock) = rig();
    let period = s.config().period();
    let starts = Arc::new(Mutex::new(Vec::new()));
    s.schedule(ScheduledCommand::new(Busy {
        clock: clock.clone(),
        work,
        starts: Arc::clone(&starts),
    }))
    .unwrap();

    for _ in 0..4 {
        let report = s.tick();
        clock.advance(pace_delay(period, report.elapsed));
    }
    let starts = starts.lock().unwrap();
    starts.windows(2).map(|w| w[1] - w[0]).collect()
}

#[test]
fn short_steps_keep_the_period() {
    let gaps = execute_gaps(Duration::from_millis(5));
    assert_eq!(gaps.len(), 3);
    assert!(gaps.iter().all(|g| *g == Duration::from_millis(20)), "{gaps:?}");
}

#[test]
fn overrunning_steps_run_back_to_back() {
    let gaps = execute_gaps(Duration::from_millis(30));
    assert_eq!(gaps.len(), 3);
    assert!(gaps.iter().all(|g| *g == Duration::from_millis(30)), "{gaps:?}");
}

#[test]
fn overruns_are_counted_not_punished() {
    let (mut s, clock) = rig();
    s.schedule(ScheduledCommand::new(Busy {
        clock: clock.clone(),
        work: Duration::from_millis(30),
        starts: Arc::default(),
    }))
    .unwrap();
    s.tick();
    s.tick();
    assert_eq!(s.stats().overruns, 2);
    assert_eq!(s.active_count(), 1);
}

#[test]
fn interrupt_can_be_raised_from_another_thread() {
    let (mut s, _) = rig();
    let journal: Journal = Arc::default();
    let id = s
        .schedule(ScheduledCommand::new(Tracked::new("t", None, &journal)))
        .unwrap();
    let handle = s.interrupt_handle(id).unwrap();

    std::thread::spawn(move || handle.set()).join().unwrap();

    let report = s.tick();
    assert_eq!(report.completed, vec![id]);
    assert_eq!(count(&journal, "t:interrupted"), 1);
}

#[test]
fn a_failing_group_does_not_stop_other_commands() {
    struct Fails;
    impl Command for Fails {
        fn execute(&mut self) -> Result<(), HookError> {
            Err("limit switch stuck".into())
        }
    }

    let (mut s, _) = rig();
    let journal: Journal = Arc::default();
    let lifter = s.register_resource("lifter");
    let other = s
        .schedule(ScheduledCommand::new(Tracked::new("other", None, &journal)))
        .unwrap();

    let mut group = CommandGroup::new("lift");
    group.add_parallel([
        ScheduledCommand::new(Fails),
        ScheduledCommand::new(Tracked::new("hold", None, &journal)).requires(lifter),
    ]);
    let g = s.schedule(group).unwrap();

    let report = s.tick();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, g);
    assert!(s.is_active(other));
    assert!(!s.resources().get(lifter).unwrap().is_locked());
    assert_eq!(count(&journal, "hold:interrupted"), 1);

    // The group can be started again after the failure.
    s.start(g).unwrap();
    assert!(s.is_active(g));
}

#[test]
fn manual_clock_is_usable_as_scheduler_clock() {
    let clock = ManualClock::new();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let s = Scheduler::with_clock(SchedulerConfig::default(), shared);
    let t0 = s.clock().now();
    clock.advance(Duration::from_millis(7));
    assert_eq!(s.clock().now() - t0, Duration::from_millis(7));
}
