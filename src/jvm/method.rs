use crate::jvm::{
    BinaryName, Error, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
};

/// Everything about a method besides its body
///
/// The simulator needs this to know what the locals look like on entry and what `this` becomes
/// once a constructor calls `<init>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodHeader {
    /// Class declaring the method
    pub class: BinaryName,

    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub access_flags: MethodAccessFlags,
}

impl MethodHeader {
    /// Build a header from its textual parts (eg. as read from a class file)
    pub fn parse(
        class: &str,
        name: &str,
        descriptor: &str,
        access_flags: MethodAccessFlags,
    ) -> Result<MethodHeader, Error> {
        Ok(MethodHeader {
            class: BinaryName::from_str(class).map_err(Error::MalformedName)?,
            name: UnqualifiedName::from_str(name).map_err(Error::MalformedName)?,
            descriptor: MethodDescriptor::parse(descriptor)?,
            access_flags,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Is this an instance initialization method?
    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }
}
