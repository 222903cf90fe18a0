#![no_main]

use irsplit::{
    ir::{
        verify_module, BlockId, ConstValue, FunctionBuilder, Instruction, IrType, ListEntry,
        Module, Terminator,
    },
    split_module, SplitConfig,
};
use libfuzzer_sys::fuzz_target;

/// Builds a function of list literals from `data`.
///
/// Each literal takes one byte: the low bits give its element count, bit 5
/// makes one element read a parameter, bit 6 moves the construction into a
/// block of its own, bit 7 stores the literal into the return slot.
fn build(data: &[u8]) -> Module {
    let ty = IrType::List(Box::new(IrType::Int));
    let mut b = FunctionBuilder::new("main", ty.clone());
    let ret = b.return_var();
    let x = b.param("x", IrType::Int);
    let local = b.local("acc", IrType::Int);
    let mut current = b.block();

    for byte in data.iter().take(64) {
        let n = usize::from(byte & 0x1f) + 1;
        let size = b.temp(IrType::Int);
        b.constant(size, ConstValue::Int(n as i64));
        let values: Vec<ListEntry> = (0..n)
            .map(|i| {
                let e = b.temp(IrType::Int);
                if i == 0 && byte & 0x20 != 0 {
                    b.mov(e, x);
                } else {
                    b.constant(e, ConstValue::Int(i as i64));
                }
                ListEntry::expr(e)
            })
            .collect();

        if byte & 0x40 != 0 {
            let next: BlockId = b.block();
            b.switch_to(current);
            b.terminate(Terminator::Goto { target: next });
            b.switch_to(next);
            current = next;
        }

        let list = b.temp(ty.clone());
        b.push(Instruction::NewArray {
            dest: list,
            ty: ty.clone(),
            size,
            values,
        });
        if byte & 0x80 != 0 {
            b.mov(ret, list);
        } else {
            b.mov(local, size);
        }
    }

    let mut module = Module::new("fuzz");
    module.functions.push(b.build());
    module
}

fuzz_target!(|data: &[u8]| {
    let Some((&threshold, rest)) = data.split_first() else {
        return;
    };
    let mut module = build(rest);
    let config = SplitConfig::eager()
        .with_function_threshold(usize::from(threshold) + 2)
        .with_periodic_threshold(usize::from(threshold % 16) + 3);

    split_module(&mut module, config).expect("split produced invalid IR");
    verify_module(&module, 250).expect("verified module");
});
