// Teardown - Ordered release of driver objects
//
// Vulkan objects must be destroyed in reverse creation order. Every
// acquisition pushes a labelled release record; the stack pops them in
// strict reverse order, either explicitly or when it is dropped (which also
// covers early returns while a context is half built).

/// A stack of release actions, run last-in first-out.
#[derive(Default)]
pub struct ReleaseStack {
    records: Vec<Release>,
}

struct Release {
    label: &'static str,
    action: Box<dyn FnOnce()>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action` to run before everything pushed earlier.
    pub fn push(&mut self, label: &'static str, action: impl FnOnce() + 'static) {
        log::trace!("Acquired {}", label);
        self.records.push(Release {
            label,
            action: Box::new(action),
        });
    }

    /// Labels in release order.
    pub fn pending(&self) -> Vec<&'static str> {
        self.records.iter().rev().map(|r| r.label).collect()
    }

    pub fn release_all(&mut self) {
        while let Some(record) = self.records.pop() {
            log::trace!("Releasing {}", record.label);
            (record.action)();
        }
    }
}

impl Drop for ReleaseStack {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording(stack: &mut ReleaseStack, log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) {
        let log = Rc::clone(log);
        stack.push(label, move || log.borrow_mut().push(label));
    }

    #[test]
    fn releases_in_reverse_acquisition_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = ReleaseStack::new();
        recording(&mut stack, &log, "instance");
        recording(&mut stack, &log, "debug messenger");
        recording(&mut stack, &log, "logical device");

        assert_eq!(stack.pending(), vec!["logical device", "debug messenger", "instance"]);

        stack.release_all();
        assert_eq!(*log.borrow(), vec!["logical device", "debug messenger", "instance"]);
        assert!(stack.pending().is_empty());
    }

    #[test]
    fn drop_releases_partial_stack() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut stack = ReleaseStack::new();
            recording(&mut stack, &log, "instance");
            recording(&mut stack, &log, "debug messenger");
            // construction bails out here
        }
        assert_eq!(*log.borrow(), vec!["debug messenger", "instance"]);
    }

    #[test]
    fn release_all_runs_each_action_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut stack = ReleaseStack::new();
        recording(&mut stack, &log, "instance");

        stack.release_all();
        stack.release_all();
        drop(stack);
        assert_eq!(*log.borrow(), vec!["instance"]);
    }
}
