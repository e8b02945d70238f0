// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Provides an in-memory implementation of [`VariableStore`] that doesn't
//! persist anywhere.

use crate::VarStoreError;
use crate::VariableStore;
use mok_specs::uefi::nvram::EfiVariableAttributes;
use mok_specs::NvramVar;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
struct Variable {
    data: Vec<u8>,
    attr: EfiVariableAttributes,
}

/// An in-memory implementation of [`VariableStore`].
#[derive(Debug, Default)]
pub struct InMemoryVarStore {
    vars: BTreeMap<NvramVar, Variable>,
}

pub struct VariableEntry<'a> {
    pub var: NvramVar,
    pub data: &'a [u8],
    pub attr: EfiVariableAttributes,
}

impl InMemoryVarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = VariableEntry<'_>> {
        self.vars.iter().map(|(k, v)| VariableEntry {
            var: *k,
            data: v.data.as_slice(),
            attr: v.attr,
        })
    }

    /// Peek at the data of a variable without going through the trait.
    pub fn get(&self, var: NvramVar) -> Option<&[u8]> {
        self.vars.get(&var).map(|v| v.data.as_slice())
    }

    pub fn clear(&mut self) {
        self.vars.clear()
    }
}

impl VariableStore for InMemoryVarStore {
    fn read(
        &mut self,
        var: NvramVar,
    ) -> Result<Option<(EfiVariableAttributes, Vec<u8>)>, VarStoreError> {
        Ok(self.vars.get(&var).map(|v| (v.attr, v.data.clone())))
    }

    fn write(
        &mut self,
        var: NvramVar,
        attr: EfiVariableAttributes,
        data: &[u8],
    ) -> Result<(), VarStoreError> {
        self.vars.insert(
            var,
            Variable {
                data: data.to_vec(),
                attr,
            },
        );
        Ok(())
    }

    fn delete(&mut self, var: NvramVar) -> Result<bool, VarStoreError> {
        Ok(self.vars.remove(&var).is_some())
    }
}

/// A collection of test-implementation helpers that operate on a generic
/// implementation of [`VariableStore`]
pub mod impl_agnostic_tests {
    use crate::VariableStore;
    use guid::Guid;
    use mok_specs::uefi::nvram::EfiVariableAttributes;
    use mok_specs::NvramVar;

    const VENDOR_1: Guid = Guid::from_static_str("2b0ea9c1-21b3-4a4e-9e50-3dc3a5e0f6a7");
    const VENDOR_2: Guid = Guid::from_static_str("9d4e8f7a-6c1b-4f0e-8a2d-5b3c7e1f0a9d");

    const VAR_1: NvramVar = NvramVar {
        name: "var1",
        vendor: VENDOR_1,
    };
    const VAR_1_OTHER_VENDOR: NvramVar = NvramVar {
        name: "var1",
        vendor: VENDOR_2,
    };
    const VAR_2: NvramVar = NvramVar {
        name: "var2",
        vendor: VENDOR_1,
    };

    pub fn test_single_variable(store: &mut dyn VariableStore) {
        let attr = EfiVariableAttributes::DEFAULT_ATTRIBUTES;
        let data = vec![0x1, 0x2, 0x3, 0x4, 0x5];
        let data1 = vec![0xa, 0xb, 0xc];

        assert!(store.read(VAR_1).unwrap().is_none());
        assert!(!store.exists(VAR_1).unwrap());

        store.write(VAR_1, attr, &data).unwrap();

        let (result_attr, result_data) = store.read(VAR_1).unwrap().unwrap();
        assert_eq!(result_attr, attr);
        assert_eq!(result_data, data);
        assert!(store.exists(VAR_1).unwrap());

        // overwrite existing variable with shorter data
        store.write(VAR_1, attr, &data1).unwrap();

        let (result_attr, result_data) = store.read(VAR_1).unwrap().unwrap();
        assert_eq!(result_attr, attr);
        assert_eq!(result_data, data1);

        assert!(store.delete(VAR_1).unwrap());

        // try to get removed variable
        assert!(store.read(VAR_1).unwrap().is_none());
        assert!(!store.delete(VAR_1).unwrap());
    }

    pub fn test_multiple_variable(store: &mut dyn VariableStore) {
        let attr = EfiVariableAttributes::DEFAULT_ATTRIBUTES;
        let bs_only = EfiVariableAttributes::new()
            .with_non_volatile(true)
            .with_bootservice_access(true);

        store.write(VAR_1, attr, &[1, 1]).unwrap();
        store.write(VAR_1_OTHER_VENDOR, bs_only, &[2, 2, 2]).unwrap();
        store.write(VAR_2, attr, &[]).unwrap();

        let (result_attr, result_data) = store.read(VAR_1).unwrap().unwrap();
        assert_eq!(result_attr, attr);
        assert_eq!(result_data, [1, 1]);

        // same name, different namespace, is a different variable
        let (result_attr, result_data) = store.read(VAR_1_OTHER_VENDOR).unwrap().unwrap();
        assert_eq!(result_attr, bs_only);
        assert_eq!(result_data, [2, 2, 2]);

        // empty payloads are distinct from absent variables
        let (_, result_data) = store.read(VAR_2).unwrap().unwrap();
        assert!(result_data.is_empty());

        assert!(store.delete(VAR_1).unwrap());
        assert!(store.read(VAR_1).unwrap().is_none());
        assert!(store.read(VAR_1_OTHER_VENDOR).unwrap().is_some());
    }
}
