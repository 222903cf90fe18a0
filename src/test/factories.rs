//! Function factories.
//!
//! Each factory returns a freshly built [`Function`] whose layout the tests
//! rely on; the block diagrams list blocks in layout order.

use crate::ir::{
    BinaryOp, ConstValue, Function, FunctionBuilder, Instruction, IrType, ListEntry,
    MappingEntry, Terminator, VarId,
};

fn int_list() -> IrType {
    IrType::List(Box::new(IrType::Int))
}

fn int(b: &mut FunctionBuilder, value: i64) -> VarId {
    let var = b.temp(IrType::Int);
    b.constant(var, ConstValue::Int(value));
    var
}

fn new_list(b: &mut FunctionBuilder, dest: VarId, size: VarId, values: &[VarId]) {
    b.push(Instruction::NewArray {
        dest,
        ty: int_list(),
        size,
        values: values.iter().copied().map(ListEntry::expr).collect(),
    });
}

/// One block building `[1, 2, .., n]` into a temporary and returning it.
///
/// ```text
/// bb0: size = n; e0..e(n-1); list = new; %0 = list; return
/// ```
pub fn straight_line_list(name: &str, n: usize) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    let ret = b.return_var();
    let size = int(&mut b, n as i64);
    let values: Vec<VarId> = (0..n).map(|i| int(&mut b, i as i64 + 1)).collect();
    let list = b.temp(int_list());
    new_list(&mut b, list, size, &values);
    b.mov(ret, list);
    b.build()
}

/// A list literal whose middle element depends on a branch.
///
/// ```text
/// bb0: size = 3; e0 = 1; branch flag ? bb1 : bb2
/// bb1: e1 = 10; goto bb3
/// bb2: e1 = 20; goto bb3
/// bb3: e2 = 5; list = new; %0 = list; goto bb4
/// bb4: return
/// ```
pub fn cross_block_list(name: &str) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    let ret = b.return_var();
    let flag = b.param("flag", IrType::Boolean);
    let e1 = b.temp(IrType::Int);
    let list = b.temp(int_list());
    let bb0 = b.block();
    let bb1 = b.block();
    let bb2 = b.block();
    let bb3 = b.block();
    let bb4 = b.block();

    b.switch_to(bb0);
    let size = int(&mut b, 3);
    let e0 = int(&mut b, 1);
    b.terminate(Terminator::Branch {
        condition: flag,
        true_target: bb1,
        false_target: bb2,
    });

    b.switch_to(bb1);
    b.constant(e1, ConstValue::Int(10));
    b.terminate(Terminator::Goto { target: bb3 });

    b.switch_to(bb2);
    b.constant(e1, ConstValue::Int(20));
    b.terminate(Terminator::Goto { target: bb3 });

    b.switch_to(bb3);
    let e2 = int(&mut b, 5);
    new_list(&mut b, list, size, &[e0, e1, e2]);
    b.mov(ret, list);
    b.terminate(Terminator::Goto { target: bb4 });

    b.switch_to(bb4);
    b.build()
}

/// A list literal that may return an error instead.
///
/// ```text
/// bb0: size = 2; e0 = 1; branch flag ? bb1 : bb2
/// bb1: %0 = failure; goto bb4
/// bb2: e1 = 2; goto bb3
/// bb3: list = new; %0 = list; goto bb4
/// bb4: return
/// ```
pub fn error_region(name: &str) -> Function {
    let mut b = FunctionBuilder::new(name, int_list().or_error());
    let ret = b.return_var();
    let flag = b.param("flag", IrType::Boolean);
    let failure = b.param("failure", IrType::Error);
    let list = b.temp(int_list());
    let bb0 = b.block();
    let bb1 = b.block();
    let bb2 = b.block();
    let bb3 = b.block();
    let bb4 = b.block();

    b.switch_to(bb0);
    let size = int(&mut b, 2);
    let e0 = int(&mut b, 1);
    b.terminate(Terminator::Branch {
        condition: flag,
        true_target: bb1,
        false_target: bb2,
    });

    b.switch_to(bb1);
    b.mov(ret, failure);
    b.terminate(Terminator::Goto { target: bb4 });

    b.switch_to(bb2);
    let e1 = int(&mut b, 2);
    b.terminate(Terminator::Goto { target: bb3 });

    b.switch_to(bb3);
    new_list(&mut b, list, size, &[e0, e1]);
    b.mov(ret, list);
    b.terminate(Terminator::Goto { target: bb4 });

    b.switch_to(bb4);
    b.build()
}

/// A list literal with an exception-table entry wholly inside it.
///
/// ```text
/// bb0: size = 2; goto bb1
/// bb1: e0 = 7; goto bb2          trap bb1..bb1 -> bb2 into err
/// bb2: e1 = 8; goto bb3
/// bb3: list = new; %0 = list; goto bb4
/// bb4: return
/// ```
pub fn trapped_region(name: &str) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    let ret = b.return_var();
    let err = b.temp(IrType::Error);
    let list = b.temp(int_list());
    let bb0 = b.block();
    let bb1 = b.block();
    let bb2 = b.block();
    let bb3 = b.block();
    let bb4 = b.block();

    b.switch_to(bb0);
    let size = int(&mut b, 2);
    b.terminate(Terminator::Goto { target: bb1 });

    b.switch_to(bb1);
    let e0 = int(&mut b, 7);
    b.terminate(Terminator::Goto { target: bb2 });
    b.trap(bb1, bb1, err, bb2);

    b.switch_to(bb2);
    let e1 = int(&mut b, 8);
    b.terminate(Terminator::Goto { target: bb3 });

    b.switch_to(bb3);
    new_list(&mut b, list, size, &[e0, e1]);
    b.mov(ret, list);
    b.terminate(Terminator::Goto { target: bb4 });

    b.switch_to(bb4);
    b.build()
}

/// The shape of a helper extracted around one list literal:
/// `[0, 10, 20, ..]` built straight into the return slot.
///
/// ```text
/// bb0: size = n; e0 = 0; e1 = 10; ..; %0 = new; goto bb1
/// bb1: return
/// ```
pub fn large_literal(name: &str, n: usize) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    b.generated();
    let ret = b.return_var();
    let bb0 = b.block();
    let bb1 = b.block();

    b.switch_to(bb0);
    let size = int(&mut b, n as i64);
    let values: Vec<VarId> = (0..n).map(|i| int(&mut b, i as i64 * 10)).collect();
    new_list(&mut b, ret, size, &values);
    b.terminate(Terminator::Goto { target: bb1 });

    b.switch_to(bb1);
    b.build()
}

/// A literal helper mixing expression and spread entries: `inner` is a
/// temporary copy of the `rest` parameter, `rest` is spread directly.
///
/// ```text
/// bb0: size = n + 2; e0 = 0; inner = rest; e1 = 1; ..;
///      %0 = new [size]{e0, ...inner, e1, .., ...rest}; goto bb1
/// bb1: return
/// ```
pub fn spread_literal(name: &str, n: usize) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    b.generated();
    let ret = b.return_var();
    let rest = b.param("rest", int_list());
    let inner = b.temp(int_list());
    let bb0 = b.block();
    let bb1 = b.block();

    b.switch_to(bb0);
    let size = int(&mut b, n as i64 + 2);
    let mut values = Vec::with_capacity(n + 2);
    for i in 0..n {
        let e = int(&mut b, i as i64);
        values.push(ListEntry::expr(e));
        if i == 0 {
            b.mov(inner, rest);
            values.push(ListEntry::spread(inner));
        }
    }
    values.push(ListEntry::spread(rest));
    b.push(Instruction::NewArray {
        dest: ret,
        ty: int_list(),
        size,
        values,
    });
    b.terminate(Terminator::Goto { target: bb1 });

    b.switch_to(bb1);
    b.build()
}

/// A literal helper with a diamond in its element computations.
///
/// ```text
/// bb0: size = 5; e0 = 1; e1 = 2; branch flag ? bb1 : bb2
/// bb1: e2 = 3; goto bb3
/// bb2: e2 = 4; goto bb3
/// bb3: e3 = e2 + e0; e4 = 6; %0 = new; goto bb4
/// bb4: return
/// ```
pub fn branching_literal(name: &str) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    b.generated();
    let ret = b.return_var();
    let flag = b.param("flag", IrType::Boolean);
    let e2 = b.temp(IrType::Int);
    let e3 = b.temp(IrType::Int);
    let bb0 = b.block();
    let bb1 = b.block();
    let bb2 = b.block();
    let bb3 = b.block();
    let bb4 = b.block();

    b.switch_to(bb0);
    let size = int(&mut b, 5);
    let e0 = int(&mut b, 1);
    let e1 = int(&mut b, 2);
    b.terminate(Terminator::Branch {
        condition: flag,
        true_target: bb1,
        false_target: bb2,
    });

    b.switch_to(bb1);
    b.constant(e2, ConstValue::Int(3));
    b.terminate(Terminator::Goto { target: bb3 });

    b.switch_to(bb2);
    b.constant(e2, ConstValue::Int(4));
    b.terminate(Terminator::Goto { target: bb3 });

    b.switch_to(bb3);
    b.push(Instruction::Binary {
        dest: e3,
        op: BinaryOp::Add,
        lhs: e2,
        rhs: e0,
    });
    let e4 = int(&mut b, 6);
    new_list(&mut b, ret, size, &[e0, e1, e2, e3, e4]);
    b.terminate(Terminator::Goto { target: bb4 });

    b.switch_to(bb4);
    b.build()
}

/// A literal helper whose element computations loop.
///
/// ```text
/// bb0: size = 2; e0 = 1; goto bb1
/// bb1: e1 = 2; branch flag ? bb1 : bb2
/// bb2: %0 = new; goto bb3
/// bb3: return
/// ```
pub fn literal_with_loop(name: &str) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    b.generated();
    let ret = b.return_var();
    let flag = b.param("flag", IrType::Boolean);
    let e1 = b.temp(IrType::Int);
    let bb0 = b.block();
    let bb1 = b.block();
    let bb2 = b.block();
    let bb3 = b.block();

    b.switch_to(bb0);
    let size = int(&mut b, 2);
    let e0 = int(&mut b, 1);
    b.terminate(Terminator::Goto { target: bb1 });

    b.switch_to(bb1);
    b.constant(e1, ConstValue::Int(2));
    b.terminate(Terminator::Branch {
        condition: flag,
        true_target: bb1,
        false_target: bb2,
    });

    b.switch_to(bb2);
    new_list(&mut b, ret, size, &[e0, e1]);
    b.terminate(Terminator::Goto { target: bb3 });

    b.switch_to(bb3);
    b.build()
}

/// A list literal that writes a `LOCAL` read again after it.
///
/// ```text
/// bb0: size = 2; e0 = 1; counter = 5; e1 = counter; list = new;
///      seen = counter; %0 = list; return
/// ```
pub fn local_mutation(name: &str) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    let ret = b.return_var();
    let counter = b.local("counter", IrType::Int);
    let seen = b.local("seen", IrType::Int);
    let size = int(&mut b, 2);
    let e0 = int(&mut b, 1);
    b.constant(counter, ConstValue::Int(5));
    let e1 = b.temp(IrType::Int);
    b.mov(e1, counter);
    let list = b.temp(int_list());
    new_list(&mut b, list, size, &[e0, e1]);
    b.mov(seen, counter);
    b.mov(ret, list);
    b.build()
}

/// A record literal `{f0: 0, f1: 1, ..}` of type `R`.
///
/// ```text
/// bb0: td = typedesc<R>; k0 = "f0"; v0 = 0; ..; rec = new td{..};
///      %0 = rec; return
/// ```
pub fn record_literal(name: &str, fields: usize) -> Function {
    let ty = IrType::Record("R".to_string());
    let mut b = FunctionBuilder::new(name, ty.clone());
    let ret = b.return_var();
    let typedesc = b.temp(IrType::TypeDesc);
    b.push(Instruction::NewTypeDesc {
        dest: typedesc,
        ty: ty.clone(),
    });
    let mut entries = Vec::with_capacity(fields);
    for i in 0..fields {
        let key = b.temp(IrType::String);
        b.constant(key, ConstValue::String(format!("f{i}")));
        let value = int(&mut b, i as i64);
        entries.push(MappingEntry::KeyValue { key, value });
    }
    let record = b.temp(ty);
    b.push(Instruction::NewStructure {
        dest: record,
        typedesc,
        fields: entries,
    });
    b.mov(ret, record);
    b.build()
}

/// A method reading `n` fields of its receiver into a list.
///
/// ```text
/// bb0: size = n; k0 = "x0"; e0 = self[k0]; ..; list = new; %0 = list;
///      goto bb1
/// bb1: return
/// ```
pub fn attached_method(name: &str, n: usize) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    let ret = b.return_var();
    let this = b.receiver(IrType::Record("Counter".to_string()));
    let list = b.temp(int_list());
    let bb0 = b.block();
    let bb1 = b.block();

    b.switch_to(bb0);
    let size = int(&mut b, n as i64);
    let mut values = Vec::with_capacity(n);
    for i in 0..n {
        let key = b.temp(IrType::String);
        b.constant(key, ConstValue::String(format!("x{i}")));
        let value = b.temp(IrType::Int);
        b.push(Instruction::FieldLoad {
            dest: value,
            object: this,
            key,
        });
        values.push(value);
    }
    new_list(&mut b, list, size, &values);
    b.mov(ret, list);
    b.terminate(Terminator::Goto { target: bb1 });

    b.switch_to(bb1);
    b.build()
}

/// A list literal whose elements come from calls to an external `observe`,
/// one block per call.
///
/// ```text
/// bb0:   size = n; c0 = 0; e0 = call observe(c0) -> bb1
/// bb1:   c1 = 1; e1 = call observe(c1) -> bb2
/// ...
/// bbN:   list = new; %0 = list; goto bbN+1
/// bbN+1: return
/// ```
pub fn list_with_calls(name: &str, n: usize) -> Function {
    let mut b = FunctionBuilder::new(name, int_list());
    let ret = b.return_var();
    let list = b.temp(int_list());
    let blocks: Vec<_> = (0..n + 2).map(|_| b.block()).collect();

    b.switch_to(blocks[0]);
    let size = int(&mut b, n as i64);
    let mut values = Vec::with_capacity(n);
    for i in 0..n {
        b.switch_to(blocks[i]);
        let arg = int(&mut b, i as i64);
        let value = b.temp(IrType::Int);
        b.terminate(Terminator::Call {
            callee: "observe".to_string(),
            args: vec![arg],
            dest: Some(value),
            then: blocks[i + 1],
        });
        values.push(value);
    }

    b.switch_to(blocks[n]);
    new_list(&mut b, list, size, &values);
    b.mov(ret, list);
    b.terminate(Terminator::Goto {
        target: blocks[n + 1],
    });

    b.switch_to(blocks[n + 1]);
    b.build()
}
