//! Class pool: the set of classes under analysis and the hierarchy links
//! between them

mod class;
mod field;
mod method;
mod refs;

pub use class::*;
pub use field::*;
pub use method::*;
pub use refs::*;

use crate::class_file;
use crate::errors::Error;
use std::collections::HashMap;
use std::fmt;

/// Identifier of a class inside one [`ClassPool`]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ClassId(pub(crate) usize);

impl fmt::Debug for ClassId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("class#{}", self.0))
    }
}

/// An insertion-ordered set of classes keyed by internal name
///
/// The pool is mutable while being populated. [`ClassPool::init`] resolves
/// the superclass/interface references of every member against the pool and
/// builds the `children`/`implementers` back-links; after that the pool is
/// frozen and may be shared freely between concurrent readers.
#[derive(Default)]
pub struct ClassPool {
    slots: Vec<Option<Class>>,
    by_name: HashMap<String, ClassId>,
    initialized: bool,
}

impl ClassPool {
    pub fn new() -> ClassPool {
        ClassPool::default()
    }

    /// Parse class bytes and add the result to the pool
    pub fn add(&mut self, bytes: &[u8]) -> Result<ClassId, Error> {
        let class = class_file::read_class(bytes)?;
        self.add_class(class)
    }

    /// Add an already-built class to the pool
    pub fn add_class(&mut self, class: Class) -> Result<ClassId, Error> {
        assert!(!self.initialized, "class pool is frozen after init()");
        if self.by_name.contains_key(&class.name) {
            return Err(Error::DuplicateClass(class.name));
        }
        let id = ClassId(self.slots.len());
        self.by_name.insert(class.name.clone(), id);
        self.slots.push(Some(class));
        Ok(id)
    }

    /// Remove a class by name
    pub fn remove(&mut self, name: &str) -> Result<Class, Error> {
        assert!(!self.initialized, "class pool is frozen after init()");
        let id = self
            .by_name
            .remove(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))?;
        Ok(self.slots[id.0].take().expect("vacated slot in name map"))
    }

    pub fn get(&self, name: &str) -> Option<&Class> {
        self.get_id(name).and_then(|id| self.class(id))
    }

    pub fn get_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn class_mut(&mut self, id: ClassId) -> Option<&mut Class> {
        assert!(!self.initialized, "class pool is frozen after init()");
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Classes in insertion order
    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Resolve every member's superclass and interface references and build
    /// the subtype back-links, then freeze the pool
    ///
    /// References to classes outside the pool stay unresolved; that is not
    /// an error.
    pub fn init(&mut self) {
        assert!(!self.initialized, "class pool is frozen after init()");

        let mut children: Vec<(ClassId, ClassId)> = vec![];
        let mut implementers: Vec<(ClassId, ClassId)> = vec![];
        for (position, class) in self.slots.iter().enumerate() {
            let class = match class {
                Some(class) => class,
                None => continue,
            };
            let id = ClassId(position);
            if let Some(parent) = class.superclass.as_ref().and_then(|re| re.resolve(self)) {
                children.push((parent, id));
            }
            for interface in &class.interfaces {
                if let Some(target) = interface.resolve(self) {
                    implementers.push((target, id));
                }
            }
        }

        for (parent, child) in children {
            self.slots[parent.0]
                .as_mut()
                .expect("resolved class vanished")
                .children
                .push(child);
        }
        for (interface, implementer) in implementers {
            self.slots[interface.0]
                .as_mut()
                .expect("resolved class vanished")
                .implementers
                .push(implementer);
        }

        self.initialized = true;
    }

    /// Nearest common superclass of two classes, by internal name
    ///
    /// Walks superclass chains through the pool; any step that leaves the
    /// pool is treated as reaching `java/lang/Object`.
    pub fn common_super_class(&self, a: &str, b: &str) -> String {
        if a == b {
            return a.to_string();
        }

        // chain walks are bounded by pool size to survive cyclic hierarchies
        let mut supers_of_a = vec![a];
        let mut current = a;
        while supers_of_a.len() <= self.slots.len() {
            match self.get(current).and_then(|class| class.superclass.as_ref()) {
                Some(parent) => {
                    supers_of_a.push(&parent.name);
                    current = &parent.name;
                }
                None => break,
            }
        }

        let mut candidate = b;
        for _ in 0..=self.slots.len() {
            if supers_of_a.contains(&candidate) {
                return candidate.to_string();
            }
            match self.get(candidate).and_then(|class| class.superclass.as_ref()) {
                Some(parent) => candidate = &parent.name,
                None => break,
            }
        }
        "java/lang/Object".to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::access_flags::ClassAccessFlags;

    fn class(name: &str, superclass: Option<&str>, interfaces: &[&str]) -> Class {
        let mut class = Class::new(name, ClassAccessFlags::PUBLIC, 52);
        class.superclass = superclass.map(ClassRef::new);
        class.interfaces = interfaces.iter().map(|s| ClassRef::new(*s)).collect();
        class
    }

    #[test]
    fn duplicate_and_unknown() {
        let mut pool = ClassPool::new();
        pool.add_class(class("a/A", None, &[])).unwrap();
        assert!(matches!(
            pool.add_class(class("a/A", None, &[])),
            Err(Error::DuplicateClass(_))
        ));
        assert!(matches!(pool.remove("a/B"), Err(Error::UnknownClass(_))));
        assert!(pool.remove("a/A").is_ok());
        assert!(pool.get("a/A").is_none());
    }

    #[test]
    fn init_builds_back_links() {
        let mut pool = ClassPool::new();
        let base = pool.add_class(class("a/Base", None, &[])).unwrap();
        let iface = {
            let mut iface = class("a/Iface", None, &[]);
            iface.access |= ClassAccessFlags::INTERFACE;
            pool.add_class(iface).unwrap()
        };
        let derived = pool
            .add_class(class("a/Derived", Some("a/Base"), &["a/Iface"]))
            .unwrap();
        // references leaving the pool resolve to nothing and are fine
        pool.add_class(class("a/External", Some("java/lang/Thread"), &[]))
            .unwrap();
        pool.init();

        assert!(pool.is_initialized());
        assert_eq!(pool.class(base).unwrap().children, vec![derived]);
        assert_eq!(pool.class(iface).unwrap().implementers, vec![derived]);
        assert!(pool.class(derived).unwrap().children.is_empty());
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut pool = ClassPool::new();
        for name in ["z/Z", "a/A", "m/M"] {
            pool.add_class(class(name, None, &[])).unwrap();
        }
        let names: Vec<&str> = pool.classes().map(|class| class.name.as_str()).collect();
        assert_eq!(names, vec!["z/Z", "a/A", "m/M"]);
    }

    #[test]
    fn common_supertypes() {
        let mut pool = ClassPool::new();
        pool.add_class(class("a/Base", None, &[])).unwrap();
        pool.add_class(class("a/Left", Some("a/Base"), &[])).unwrap();
        pool.add_class(class("a/Right", Some("a/Base"), &[])).unwrap();
        pool.add_class(class("a/Deep", Some("a/Left"), &[])).unwrap();

        assert_eq!(pool.common_super_class("a/Left", "a/Left"), "a/Left");
        assert_eq!(pool.common_super_class("a/Left", "a/Right"), "a/Base");
        assert_eq!(pool.common_super_class("a/Deep", "a/Right"), "a/Base");
        assert_eq!(pool.common_super_class("a/Deep", "a/Left"), "a/Left");
        // unknown classes collapse to Object
        assert_eq!(
            pool.common_super_class("a/Left", "x/Unknown"),
            "java/lang/Object"
        );
    }
}
